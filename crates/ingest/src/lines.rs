//! 원시 바이트를 줄 단위로 나누고 텍스트로 디코딩합니다.
//!
//! - 줄 구분은 `\n`이며 끝의 `\r`은 제거합니다.
//! - 마지막 줄이 `\n`으로 끝나지 않으면 아직 쓰이는 중인 것으로 보고 돌려주지 않습니다.
//!   (읽기 한도에 걸려 줄바꿈이 하나도 없을 때만 예외)
//! - 각 줄은 UTF-8로 먼저 디코딩하고, 실패하면 Latin-1(단일 바이트) 대체를 시도합니다.
//!   NUL 바이트가 섞인 줄은 바이너리로 보고 버립니다.

use std::borrow::Cow;

/// 완결된 한 줄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// 줄 내용 (줄바꿈 제외)
    pub bytes: &'a [u8],
    /// 버퍼 시작부터 이 줄의 줄바꿈 다음 바이트까지의 길이
    pub end: usize,
}

/// 버퍼에서 완결된 줄을 모두 꺼냅니다.
///
/// `force_partial`이 참이고 버퍼에 줄바꿈이 하나도 없으면 버퍼 전체를 한 줄로 취급합니다.
pub fn complete_lines(buf: &[u8], force_partial: bool) -> Vec<RawLine<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (idx, byte) in buf.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(RawLine {
                bytes: strip_cr(&buf[start..idx]),
                end: idx + 1,
            });
            start = idx + 1;
        }
    }

    if lines.is_empty() && force_partial && !buf.is_empty() {
        lines.push(RawLine {
            bytes: strip_cr(buf),
            end: buf.len(),
        });
    }
    lines
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// 디코딩 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// 유효한 UTF-8
    Utf8(&'a str),
    /// Latin-1 대체 디코딩
    Latin1(String),
    /// 텍스트로 볼 수 없어 버림
    Binary,
}

impl<'a> Decoded<'a> {
    /// 텍스트가 있으면 돌려줍니다.
    pub fn text(&self) -> Option<Cow<'a, str>> {
        match self {
            Self::Utf8(s) => Some(Cow::Borrowed(*s)),
            Self::Latin1(s) => Some(Cow::Owned(s.clone())),
            Self::Binary => None,
        }
    }
}

/// 한 줄을 디코딩합니다.
pub fn decode_line(bytes: &[u8]) -> Decoded<'_> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Decoded::Utf8(text);
    }
    if bytes.contains(&0) {
        return Decoded::Binary;
    }
    Decoded::Latin1(bytes.iter().map(|&b| char::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline_and_strips_cr() {
        let lines = complete_lines(b"a\r\nbb\nccc\n", false);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].bytes, b"a");
        assert_eq!(lines[0].end, 3);
        assert_eq!(lines[1].bytes, b"bb");
        assert_eq!(lines[2].bytes, b"ccc");
        assert_eq!(lines[2].end, 10);
    }

    #[test]
    fn trailing_partial_line_is_held_back() {
        let lines = complete_lines(b"one\ntwo", false);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].end, 4);
    }

    #[test]
    fn forced_partial_only_without_any_newline() {
        let lines = complete_lines(b"no newline at all", true);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].end, 17);

        let lines = complete_lines(b"one\ntwo", true);
        assert_eq!(lines.len(), 1, "partial tail still waits when a newline exists");
    }

    #[test]
    fn empty_lines_are_kept_as_positions() {
        let lines = complete_lines(b"\n\nx\n", false);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].bytes.is_empty());
        assert_eq!(lines[2].end, 4);
    }

    #[test]
    fn utf8_is_borrowed() {
        assert_eq!(decode_line("Plāyer".as_bytes()), Decoded::Utf8("Plāyer"));
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1() {
        // 0xE9 = 'é' in Latin-1, invalid as a lone UTF-8 byte
        let decoded = decode_line(b"Jos\xE9;1");
        assert_eq!(decoded, Decoded::Latin1("José;1".to_owned()));
        assert_eq!(decoded.text().unwrap(), "José;1");
    }

    #[test]
    fn binary_garbage_is_dropped() {
        let decoded = decode_line(b"\x00\x00\xFF\xFE");
        assert_eq!(decoded, Decoded::Binary);
        assert!(decoded.text().is_none());
    }
}
