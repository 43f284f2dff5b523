//! Timed cue script parsing (SubRip-style blocks).
//!
//! Blocks are separated by blank lines: an index line, a timecode line
//! (`HH:MM:SS,mmm --> HH:MM:SS,mmm`, comma or dot before the milliseconds),
//! and one or more text lines joined with spaces. Malformed blocks are
//! skipped and counted. Long phrases wrap at word boundaries into sibling
//! entries that share timing and color but stack vertically.

use rand::Rng;

use crate::params::LayoutConfig;

/// Bright, saturated phrase colors (linear-ish RGB in [0, 1])
pub const PALETTE: [[f32; 3]; 10] = [
    [1.0, 0.341, 0.2],   // red-orange
    [0.2, 1.0, 0.961],   // cyan
    [1.0, 0.988, 0.2],   // yellow
    [1.0, 0.2, 0.961],   // pink
    [0.2, 1.0, 0.341],   // green
    [0.341, 0.2, 1.0],   // blue-purple
    [1.0, 0.2, 0.4],     // pink-red
    [0.4, 1.0, 0.2],     // lime
    [0.2, 0.733, 1.0],   // sky blue
    [1.0, 0.6, 0.2],     // orange
];

/// One displayable line produced from the script, post word-wrapping
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub color: [f32; 3],
    /// Fixed vertical offset for sibling lines of a wrapped phrase
    /// (world units); `None` for phrases that fit on one line
    pub stack_offset: Option<f32>,
}

/// Parse result with the count of blocks that were skipped as malformed
#[derive(Debug, Default)]
pub struct ParsedScript {
    pub entries: Vec<ScriptEntry>,
    pub malformed_blocks: usize,
}

/// Parse a full script into timed entries
pub fn parse_script(content: &str, layout: &LayoutConfig) -> ParsedScript {
    let mut rng = rand::rng();
    parse_script_with_rng(content, layout, &mut rng)
}

/// Parse with a caller-supplied RNG (color assignment)
pub fn parse_script_with_rng<R: Rng>(
    content: &str,
    layout: &LayoutConfig,
    rng: &mut R,
) -> ParsedScript {
    let normalized = content.replace("\r\n", "\n");
    let mut out = ParsedScript::default();

    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            out.malformed_blocks += 1;
            continue;
        }

        let Some((start_ms, end_ms)) = parse_timecode_line(lines[1]) else {
            out.malformed_blocks += 1;
            continue;
        };

        let text = lines[2..].join(" ");
        let text = text.trim();
        if text.is_empty() {
            // A cue with no visible text never existed as far as the
            // timeline is concerned
            continue;
        }

        let color = PALETTE[rng.random_range(0..PALETTE.len())];
        let wrapped = wrap_line(text, layout.max_line_chars);
        let count = wrapped.len();

        for (i, line) in wrapped.into_iter().enumerate() {
            let stack_offset = if count > 1 {
                // First line on top, descending in Y
                Some(((count - 1) as f32 / 2.0 - i as f32) * layout.line_stack_spacing)
            } else {
                None
            };
            out.entries.push(ScriptEntry {
                text: line,
                start_ms,
                end_ms,
                color,
                stack_offset,
            });
        }
    }

    out
}

/// Parse `HH:MM:SS,mmm --> HH:MM:SS,mmm` into start/end milliseconds
fn parse_timecode_line(line: &str) -> Option<(u64, u64)> {
    let mut parts = line.split(" --> ");
    let start = timecode_to_ms(parts.next()?.trim())?;
    let end = timecode_to_ms(parts.next()?.trim())?;
    if parts.next().is_some() {
        return None;
    }
    Some((start, end))
}

/// Convert a single timecode (comma or dot millisecond separator) to ms
pub fn timecode_to_ms(timecode: &str) -> Option<u64> {
    let timecode = timecode.replace(',', ".");
    let (clock, millis) = timecode.split_once('.')?;

    let mut fields = clock.split(':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds: u64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let millis: u64 = millis.parse().ok()?;
    Some((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
}

/// Greedy word wrap; a single over-long word stays on its own line
fn wrap_line(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse(content: &str) -> ParsedScript {
        let mut rng = StdRng::seed_from_u64(7);
        parse_script_with_rng(content, &LayoutConfig::default(), &mut rng)
    }

    #[test]
    fn test_timecode_to_ms() {
        assert_eq!(timecode_to_ms("00:01:02,500"), Some(62500));
        assert_eq!(timecode_to_ms("00:00:00.000"), Some(0));
        assert_eq!(timecode_to_ms("01:00:00,001"), Some(3_600_001));
        assert_eq!(timecode_to_ms("garbage"), None);
        assert_eq!(timecode_to_ms("00:01,500"), None);
    }

    #[test]
    fn test_parse_basic_block() {
        let script = "1\n00:00:01,000 --> 00:00:03,000\nHELLO\n";
        let parsed = parse(script);

        assert_eq!(parsed.malformed_blocks, 0);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].text, "HELLO");
        assert_eq!(parsed.entries[0].start_ms, 1000);
        assert_eq!(parsed.entries[0].end_ms, 3000);
        assert_eq!(parsed.entries[0].stack_offset, None);
    }

    #[test]
    fn test_multiple_text_lines_join_with_spaces() {
        let script = "1\n00:00:01,000 --> 00:00:03,000\nfirst\nsecond\n";
        let parsed = parse(script);
        assert_eq!(parsed.entries[0].text, "first second");
    }

    #[test]
    fn test_malformed_blocks_are_dropped_and_counted() {
        let script = "\
1
00:00:01,000 --> 00:00:02,000
keep me

2
00:00:03,000 00:00:04,000
no separator

3
not a timecode at all

4
00:00:05,000 --> 00:00:06,000
keep me too
";
        let parsed = parse(script);
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.malformed_blocks, 2);
    }

    #[test]
    fn test_short_block_is_malformed() {
        let parsed = parse("1\n00:00:01,000 --> 00:00:02,000\n");
        assert_eq!(parsed.entries.len(), 0);
        assert_eq!(parsed.malformed_blocks, 1);
    }

    #[test]
    fn test_whitespace_only_text_is_omitted_silently() {
        let script = "1\n00:00:01,000 --> 00:00:02,000\n   \n";
        let parsed = parse(script);
        // Not malformed, just no cue to show
        assert_eq!(parsed.entries.len(), 0);
        assert_eq!(parsed.malformed_blocks, 0);
    }

    #[test]
    fn test_long_phrase_wraps_into_stacked_siblings() {
        let script = "1\n00:00:01,000 --> 00:00:04,000\n\
            the quick brown fox jumps over the lazy dog\n";
        let parsed = parse(script);

        assert!(parsed.entries.len() > 1);
        let first = &parsed.entries[0];
        for entry in &parsed.entries {
            assert_eq!(entry.start_ms, first.start_ms);
            assert_eq!(entry.end_ms, first.end_ms);
            assert_eq!(entry.color, first.color);
            assert!(entry.stack_offset.is_some());
            assert!(entry.text.len() <= LayoutConfig::default().max_line_chars);
        }

        // Offsets descend from top line to bottom line
        let offsets: Vec<f32> = parsed
            .entries
            .iter()
            .map(|e| e.stack_offset.unwrap())
            .collect();
        for pair in offsets.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_wrap_line_respects_word_boundaries() {
        let lines = wrap_line("aaa bbb ccc", 7);
        assert_eq!(lines, vec!["aaa bbb".to_string(), "ccc".to_string()]);

        // One over-long word is kept whole
        let lines = wrap_line("supercalifragilistic", 7);
        assert_eq!(lines, vec!["supercalifragilistic".to_string()]);
    }

    #[test]
    fn test_dot_millisecond_separator() {
        let script = "1\n00:00:01.250 --> 00:00:02.750\nok\n";
        let parsed = parse(script);
        assert_eq!(parsed.entries[0].start_ms, 1250);
        assert_eq!(parsed.entries[0].end_ms, 2750);
    }
}
