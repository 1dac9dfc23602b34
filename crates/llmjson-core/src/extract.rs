/// A balanced `{...}` or `[...]` span of the input.
///
/// `end` is inclusive and points at the matching closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub start: usize,
    pub end: usize,
    pub opener: char,
    pub text: &'a str,
}

/// Scans `text` for balanced spans, in order of their opening bracket.
///
/// Only the opener's own bracket kind counts toward depth. Quotes toggle a
/// string state in which brackets are ignored, and a backslash inside a
/// string consumes the next byte. Once a span matches, scanning resumes after
/// its closer, so nested spans are not emitted separately. An opener that
/// never balances is skipped and scanning resumes right after it.
pub fn extract_candidates(text: &str) -> Vec<Candidate<'_>> {
    scan(text).0
}

/// Texts to attempt, in order: every balanced span, then the suffix from the
/// first opener that never balanced (a truncated document whose inner
/// objects did close). With no balanced span at all, the whole input comes
/// first, followed by its suffix from the first opener when prose precedes it.
pub fn candidate_texts(text: &str) -> Vec<&str> {
    let (spans, unbalanced) = scan(text);
    if !spans.is_empty() {
        let mut texts: Vec<&str> = spans.into_iter().map(|c| c.text).collect();
        if let Some(tail) = unbalanced.and_then(|start| text.get(start..)) {
            texts.push(tail);
        }
        return texts;
    }

    let mut texts = vec![text];
    if let Some(tail) = next_opener(text.as_bytes(), 0)
        .filter(|&start| start > 0)
        .and_then(|start| text.get(start..))
    {
        texts.push(tail);
    }
    texts
}

/// Balanced spans plus the offset of the first opener skipped as unbalanced.
fn scan(text: &str) -> (Vec<Candidate<'_>>, Option<usize>) {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut unbalanced = None;
    let mut cursor = 0;

    while let Some(start) = next_opener(bytes, cursor) {
        let Some(end) = match_span(bytes, start) else {
            unbalanced.get_or_insert(start);
            cursor = start + 1;
            continue;
        };
        // brackets are ASCII, so both offsets sit on char boundaries
        if let (Some(span), Some(&opener)) = (text.get(start..=end), bytes.get(start)) {
            candidates.push(Candidate {
                start,
                end,
                opener: char::from(opener),
                text: span,
            });
        }
        cursor = end + 1;
    }

    (candidates, unbalanced)
}

fn next_opener(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|b| matches!(b, b'{' | b'['))
        .map(|offset| from + offset)
}

fn match_span(bytes: &[u8], start: usize) -> Option<usize> {
    let mut scanner = SpanScanner::new(*bytes.get(start)?)?;
    bytes
        .iter()
        .enumerate()
        .skip(start)
        .find_map(|(index, &byte)| scanner.feed(byte).then_some(index))
}

struct SpanScanner {
    opener: u8,
    closer: u8,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl SpanScanner {
    fn new(opener: u8) -> Option<Self> {
        let closer = match opener {
            b'{' => b'}',
            b'[' => b']',
            _ => return None,
        };
        Some(Self {
            opener,
            closer,
            depth: 0,
            in_string: false,
            escaped: false,
        })
    }

    /// Returns true when `byte` closes the span.
    fn feed(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        if byte == b'"' {
            self.in_string = true;
        } else if byte == self.opener {
            self.depth += 1;
        } else if byte == self.closer {
            self.depth = self.depth.saturating_sub(1);
            return self.depth == 0;
        }
        false
    }
}
