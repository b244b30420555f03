//! Encoder/Wrapper: Unicode text in, 40-column Latin-1 lines out.
//!
//! Batch wrapping is the streaming wrapper fed in one go, so a response
//! rendered fragment by fragment is byte-identical to the same response
//! rendered whole.

/// Columns on a Minitel screen.
pub const DEFAULT_WIDTH: usize = 40;

/// Glyph used for characters with no Latin-1 representation.
pub const PLACEHOLDER: char = '?';

pub const EOL: &[u8] = b"\r\n";

enum Mapped {
    Char(char),
    Text(&'static str),
    Newline,
    CarriageReturn,
    Drop,
}

fn map_char(c: char) -> Mapped {
    match c {
        '\n' => Mapped::Newline,
        '\r' => Mapped::CarriageReturn,
        '\t' => Mapped::Char(' '),
        '\u{00a0}' | '\u{2007}' | '\u{2009}' | '\u{202f}' => Mapped::Char(' '),
        '\u{00ad}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}' => Mapped::Drop,
        '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => Mapped::Char('\''),
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => Mapped::Char('"'),
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => {
            Mapped::Char('-')
        }
        '\u{2026}' => Mapped::Text("..."),
        '\u{2022}' | '\u{00b7}' => Mapped::Char('*'),
        '\u{0152}' => Mapped::Text("OE"),
        '\u{0153}' => Mapped::Text("oe"),
        '\u{20ac}' => Mapped::Text("EUR"),
        c if c.is_control() => Mapped::Drop,
        c if u32::from(c) <= 0xff => Mapped::Char(c),
        c => {
            tracing::debug!("Encoding gap: U+{:04X} replaced", u32::from(c));
            Mapped::Char(PLACEHOLDER)
        }
    }
}

/// Map text to printable Latin-1, one paragraph per `\n`.
pub fn to_latin1(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_cr = false;
    for c in text.chars() {
        match map_char(c) {
            Mapped::Char(c) => out.push(c),
            Mapped::Text(s) => out.push_str(s),
            Mapped::Newline if after_cr => {}
            Mapped::Newline | Mapped::CarriageReturn => out.push('\n'),
            Mapped::Drop => {}
        }
        after_cr = c == '\r';
    }
    out
}

/// Wrap `text` into lines of at most `width` columns.
///
/// Every newline ends a paragraph and every paragraph yields at least one
/// line, so blank lines survive. A trailing newline adds nothing and empty
/// text yields no lines.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut wrapper = StreamWrapper::new(width);
    let mut lines = wrapper.push(text);
    lines.extend(wrapper.finish());
    lines
}

/// One line as it goes on the wire: Latin-1 bytes then CR LF.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = to_latin1(line)
        .chars()
        .filter(|&c| c != '\n')
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    bytes.extend_from_slice(EOL);
    bytes
}

/// Text without a line terminator (prompts, the pager marker).
pub fn encode_raw(text: &str) -> Vec<u8> {
    to_latin1(text)
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Incremental word wrapper.
///
/// `push` returns every line whose content can no longer change; `finish`
/// flushes the rest.
#[derive(Debug)]
pub struct StreamWrapper {
    width: usize,
    paragraph: Vec<char>,
    emitted_in_paragraph: bool,
    after_cr: bool,
}

impl StreamWrapper {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            paragraph: Vec::new(),
            emitted_in_paragraph: false,
            after_cr: false,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for c in fragment.chars() {
            let was_cr = self.after_cr;
            self.after_cr = c == '\r';
            match map_char(c) {
                // Spaces at a soft break belong to neither line.
                Mapped::Char(' ') if self.emitted_in_paragraph && self.paragraph.is_empty() => {}
                Mapped::Char(c) => self.paragraph.push(c),
                Mapped::Text(s) => self.paragraph.extend(s.chars()),
                Mapped::Newline if was_cr => {}
                Mapped::Newline | Mapped::CarriageReturn => self.end_paragraph(&mut lines),
                Mapped::Drop => {}
            }
            self.drain_full_lines(&mut lines);
        }
        lines
    }

    pub fn finish(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let blank = self.paragraph.iter().all(|&c| c == ' ');
        if blank && !self.emitted_in_paragraph {
            // An unterminated blank tail shows nothing.
            self.paragraph.clear();
        } else {
            self.end_paragraph(&mut lines);
        }
        lines
    }

    fn end_paragraph(&mut self, lines: &mut Vec<String>) {
        let rest: String = self.paragraph.drain(..).collect();
        let rest = rest.trim_end();
        if !rest.is_empty() || !self.emitted_in_paragraph {
            lines.push(rest.to_string());
        }
        self.emitted_in_paragraph = false;
    }

    /// Greedy first-fit: once the paragraph is longer than `width`, its
    /// first line is fixed by the first `width + 1` characters.
    fn drain_full_lines(&mut self, lines: &mut Vec<String>) {
        while self.paragraph.len() > self.width {
            let w = self.width;
            let (end, resume) = if self.paragraph[w] == ' ' {
                (w, w)
            } else {
                match self.paragraph[..w].iter().rposition(|&c| c == ' ') {
                    Some(i) if self.paragraph[..i].iter().any(|&c| c != ' ') => (i, i + 1),
                    _ => (w, w),
                }
            };

            let line: String = self.paragraph[..end].iter().collect();
            let line = line.trim_end();
            if !line.is_empty() {
                lines.push(line.to_string());
                self.emitted_in_paragraph = true;
            }

            let skip = self.paragraph[resume..]
                .iter()
                .take_while(|&&c| c == ' ')
                .count();
            self.paragraph.drain(..resume + skip);
        }
    }
}
