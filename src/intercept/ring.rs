// Circular log of decoded console output, one per virtual console.
//
// Four positions chase each other around the ring: `tail` (oldest byte
// still held), `head` (next write), `mark` (last position copied out to
// the reader), and `echopoint` (position just past the most recent echoed
// character).  When the head overruns the tail, any enclosed position that
// lands on the dropped cell is reset to None - that data is simply gone.

pub struct ConsoleLog {
    area: Vec<u32>,
    head: usize,
    tail: usize,
    mark: Option<usize>,
    echopoint: Option<usize>,
}

impl ConsoleLog {
    /// `capacity` cells; one cell is kept free to distinguish full from
    /// empty, so the log holds at most `capacity - 1` code points.
    pub fn new(capacity: usize) -> ConsoleLog {
        ConsoleLog {
            area: vec![0; capacity.max(2)],
            head: 0,
            tail: 0,
            mark: Some(0),
            echopoint: None,
        }
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.mark = Some(0);
        self.echopoint = None;
    }

    fn bump(&self, p: usize) -> usize {
        let p = p + 1;
        if p == self.area.len() {
            0
        } else {
            p
        }
    }

    /// Append one code point, dropping the oldest if full.
    pub fn append(&mut self, c: u32) {
        self.area[self.head] = c;
        self.head = self.bump(self.head);
        if self.head == self.tail {
            if self.mark == Some(self.tail) {
                self.mark = None;
            }
            if self.echopoint == Some(self.tail) {
                self.echopoint = None;
            }
            self.tail = self.bump(self.tail);
        }
    }

    pub fn set_echopoint_head(&mut self) {
        self.echopoint = Some(self.head);
    }

    pub fn has_echopoint(&self) -> bool {
        self.echopoint.is_some()
    }

    /// Anything between the reader's mark and the head?
    pub fn behind(&self) -> bool {
        self.mark != Some(self.head)
    }

    /// Ring distance from `from` to `to`, walking forward.
    fn span(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            (self.area.len() - from) + to
        }
    }

    /// Copy out everything from the mark (or the tail, if the mark was
    /// lost to overwrite) up to either the echopoint or the head, then
    /// advance the mark there and clear the echopoint.
    pub fn take_catchup(&mut self, to_echopoint: bool) -> Vec<u32> {
        let cup = if to_echopoint {
            match self.echopoint {
                Some(p) => p,
                None => self.head,
            }
        } else {
            self.head
        };
        let from = self.mark.unwrap_or(self.tail);
        let n = self.span(from, cup);
        let mut out = Vec::with_capacity(n);
        let mut p = from;
        for _ in 0..n {
            out.push(self.area[p]);
            p = self.bump(p);
        }
        self.mark = Some(cup);
        self.echopoint = None;
        out
    }

    /// Oldest-to-newest contents, for tests and the debug dump.
    pub fn snapshot(&self) -> Vec<u32> {
        let n = self.span(self.tail, self.head);
        let mut out = Vec::with_capacity(n);
        let mut p = self.tail;
        for _ in 0..n {
            out.push(self.area[p]);
            p = self.bump(p);
        }
        out
    }
}
