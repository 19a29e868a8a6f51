use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, Read, Stdin},
    path::Path,
};

use crate::Error;

enum Source {
    Text { bytes: Vec<u8>, pos: usize },
    File(BufReader<File>),
    Stdin(Stdin),
}

/// The input collaborator: an ordered queue of byte sources, consumed front
/// to back. `next_key` yields one byte at a time and `None` once the final
/// source is exhausted.
pub struct Input {
    sources: VecDeque<Source>,
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

impl Input {
    pub fn new() -> Self {
        Self {
            sources: VecDeque::new(),
        }
    }

    pub fn push_text(&mut self, text: &str) {
        self.sources.push_back(Source::Text {
            bytes: text.as_bytes().to_vec(),
            pos: 0,
        });
    }

    pub fn push_file(&mut self, path: &Path) -> Result<(), Error> {
        let file = File::open(path).map_err(|e| Error::Io(e.kind()))?;
        self.sources.push_back(Source::File(BufReader::new(file)));
        Ok(())
    }

    pub fn push_stdin(&mut self) {
        self.sources.push_back(Source::Stdin(std::io::stdin()));
    }

    /// Read the next byte from the active source, advancing through the
    /// queue as sources run dry.
    pub fn next_key(&mut self) -> Result<Option<u8>, Error> {
        loop {
            let src = match self.sources.front_mut() {
                Some(src) => src,
                None => return Ok(None),
            };
            let key = match src {
                Source::Text { bytes, pos } => {
                    let b = bytes.get(*pos).copied();
                    *pos += 1;
                    b
                }
                Source::File(reader) => read_one(reader)?,
                Source::Stdin(stdin) => read_one(stdin)?,
            };
            match key {
                Some(b) => return Ok(Some(b)),
                None => {
                    self.sources.pop_front();
                }
            }
        }
    }
}

fn read_one<R: Read>(reader: &mut R) -> Result<Option<u8>, Error> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e.kind())),
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::Input;

    #[test]
    fn sources_in_order() {
        let mut input = Input::new();
        input.push_text("ab");
        input.push_text("c");

        let mut got = Vec::new();
        while let Some(b) = input.next_key().unwrap() {
            got.push(b);
        }
        assert_eq!(got, b"abc");
        // Stays dry until another source is queued.
        assert_eq!(input.next_key().unwrap(), None);
        input.push_text("d");
        assert_eq!(input.next_key().unwrap(), Some(b'd'));
    }
}
