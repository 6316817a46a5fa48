//! Reasoning block filter
//!
//! Scans the delta stream for `<think>...</think>` spans and withholds them
//! from the client-facing output. Text outside markers is passed through
//! immediately; the only buffering is a carry-over of trailing characters
//! that could be the start of a marker split across two deltas.

const START_TAG: &str = "<think>";
const END_TAG: &str = "</think>";

/// Output of one filter step
#[derive(Debug, Default, PartialEq)]
pub struct Filtered {
    /// Text safe to relay to the client
    pub visible: String,
    /// Text withheld from the client (diverted to logs by the relay)
    pub suppressed: String,
}

/// Longest `k < tag.len()` such that `s` ends with `tag[..k]`
///
/// Tags are ASCII, so slicing `s` at `s.len() - k` always lands on a char
/// boundary when the suffix matches.
fn partial_tag_len(s: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(s.len());
    (1..=max)
        .rev()
        .find(|&k| s.ends_with(&tag[..k]))
        .unwrap_or(0)
}

/// Stateful marker filter, one instance per request
#[derive(Debug, Default)]
pub struct ReasoningFilter {
    inside: bool,
    carry: String,
}

impl ReasoningFilter {
    /// Create a fresh filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one content delta
    pub fn push(&mut self, delta: &str) -> Filtered {
        let mut input = std::mem::take(&mut self.carry);
        input.push_str(delta);

        let mut out = Filtered::default();
        let mut rest = input.as_str();

        loop {
            if self.inside {
                match rest.find(END_TAG) {
                    Some(pos) => {
                        out.suppressed.push_str(&rest[..pos]);
                        rest = &rest[pos + END_TAG.len()..];
                        self.inside = false;
                    }
                    None => {
                        let hold = partial_tag_len(rest, END_TAG);
                        out.suppressed.push_str(&rest[..rest.len() - hold]);
                        self.carry = rest[rest.len() - hold..].to_string();
                        break;
                    }
                }
            } else {
                match rest.find(START_TAG) {
                    Some(pos) => {
                        out.visible.push_str(&rest[..pos]);
                        rest = &rest[pos + START_TAG.len()..];
                        self.inside = true;
                    }
                    None => {
                        let hold = partial_tag_len(rest, START_TAG);
                        out.visible.push_str(&rest[..rest.len() - hold]);
                        self.carry = rest[rest.len() - hold..].to_string();
                        break;
                    }
                }
            }
        }

        out
    }

    /// Flush at stream end
    ///
    /// Anything still buffered is unresolved: an unclosed block or a partial
    /// tag. Either way it stays suppressed, never leaked.
    pub fn finish(self) -> Filtered {
        Filtered {
            visible: String::new(),
            suppressed: self.carry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a delta sequence through a fresh filter, concatenating outputs
    fn run(deltas: &[&str]) -> (String, String) {
        let mut filter = ReasoningFilter::new();
        let mut visible = String::new();
        let mut suppressed = String::new();
        for delta in deltas {
            let out = filter.push(delta);
            visible.push_str(&out.visible);
            suppressed.push_str(&out.suppressed);
        }
        let tail = filter.finish();
        visible.push_str(&tail.visible);
        suppressed.push_str(&tail.suppressed);
        (visible, suppressed)
    }

    #[test]
    fn test_plain_text_passes_through() {
        let (visible, suppressed) = run(&["hello ", "world"]);
        assert_eq!(visible, "hello world");
        assert_eq!(suppressed, "");
    }

    #[test]
    fn test_think_block_suppressed() {
        let (visible, suppressed) = run(&["a<think>secret</think>b"]);
        assert_eq!(visible, "ab");
        assert_eq!(suppressed, "secret");
    }

    #[test]
    fn test_multiple_blocks() {
        let (visible, suppressed) = run(&["x<think>one</think>y<think>two</think>z"]);
        assert_eq!(visible, "xyz");
        assert_eq!(suppressed, "onetwo");
    }

    #[test]
    fn test_split_invariance() {
        // For every split point, the relayed output must contain zero
        // characters from inside the marker pair
        let full = "pre<think>hidden reasoning</think>post";
        for split in 0..=full.len() {
            if !full.is_char_boundary(split) {
                continue;
            }
            let (visible, suppressed) = run(&[&full[..split], &full[split..]]);
            assert_eq!(visible, "prepost", "split at {}", split);
            assert_eq!(suppressed, "hidden reasoning", "split at {}", split);
        }
    }

    #[test]
    fn test_tag_split_across_three_deltas() {
        let (visible, suppressed) = run(&["a<th", "in", "k>hidden</th", "ink>b"]);
        assert_eq!(visible, "ab");
        assert_eq!(suppressed, "hidden");
    }

    #[test]
    fn test_unclosed_block_flushed_as_suppressed() {
        let (visible, suppressed) = run(&["ok<think>never closed"]);
        assert_eq!(visible, "ok");
        assert_eq!(suppressed, "never closed");
    }

    #[test]
    fn test_partial_start_tag_at_end_not_leaked() {
        let (visible, suppressed) = run(&["done<thi"]);
        assert_eq!(visible, "done");
        assert_eq!(suppressed, "<thi");
    }

    #[test]
    fn test_lookalike_tag_is_relayed() {
        // "<think " never completes the marker, so nothing is withheld
        let (visible, suppressed) = run(&["a<thi", "nk about it"]);
        assert_eq!(visible, "a<think about it");
        assert_eq!(suppressed, "");
    }

    #[test]
    fn test_angle_bracket_passthrough() {
        let (visible, suppressed) = run(&["1 < 2 and 3 > 2"]);
        assert_eq!(visible, "1 < 2 and 3 > 2");
        assert_eq!(suppressed, "");
    }

    #[test]
    fn test_multibyte_text_around_markers() {
        let (visible, suppressed) = run(&["héllo<think>ü</think>wörld"]);
        assert_eq!(visible, "héllowörld");
        assert_eq!(suppressed, "ü");
    }

    #[test]
    fn test_empty_deltas_are_harmless() {
        let (visible, suppressed) = run(&["", "a", "", "<think>", "", "x</think>", ""]);
        assert_eq!(visible, "a");
        assert_eq!(suppressed, "x");
    }
}
