//! Textual object syntax.
//!
//! The serializer and the parser are exact inverses for every payload the
//! serializer produces. The parser also accepts the looser forms found in
//! stores written by other producers: comments, hex strings, octal escapes,
//! and streams whose `/Length` is missing or wrong.

use folio_types::{Dictionary, ObjectRef, Payload, Stream};

use crate::error::{XrefError, XrefResult};

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Deepest array/dictionary nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Append the direct form of `payload` to `out`.
pub fn write_payload(out: &mut Vec<u8>, payload: &Payload) {
    match payload {
        Payload::Null => out.extend_from_slice(b"null"),
        Payload::Boolean(true) => out.extend_from_slice(b"true"),
        Payload::Boolean(false) => out.extend_from_slice(b"false"),
        Payload::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Payload::Real(r) => write_real(out, *r),
        Payload::Name(name) => write_name(out, name),
        Payload::String(bytes) => write_string(out, bytes),
        Payload::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_payload(out, item);
            }
            out.push(b']');
        }
        Payload::Dictionary(dict) => write_dictionary(out, dict),
        Payload::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.insert("Length", stream.data.len() as i64);
            write_dictionary(out, &dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.data);
            out.extend_from_slice(b"\nendstream");
        }
        Payload::Reference(r) => {
            out.extend_from_slice(format!("{} {} R", r.number, r.generation).as_bytes())
        }
    }
}

/// Append `N G obj ... endobj` for `payload`.
pub fn write_indirect(out: &mut Vec<u8>, reference: ObjectRef, payload: &Payload) {
    out.extend_from_slice(format!("{} {} obj\n", reference.number, reference.generation).as_bytes());
    write_payload(out, payload);
    out.extend_from_slice(b"\nendobj\n");
}

/// Direct form of `payload` as a fresh buffer.
pub fn encode_payload(payload: &Payload) -> Vec<u8> {
    let mut out = Vec::new();
    write_payload(&mut out, payload);
    out
}

pub(crate) fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (i, (key, value)) in dict.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        write_name(out, key);
        out.push(b' ');
        write_payload(out, value);
    }
    out.extend_from_slice(b">>");
}

/// Reals always carry a `.` so they read back as reals. `Display` for
/// `f64` never switches to exponent notation.
fn write_real(out: &mut Vec<u8>, r: f64) {
    let mut text = if r.is_finite() {
        format!("{r}")
    } else {
        "0".to_string()
    };
    if !text.contains('.') {
        text.push_str(".0");
    }
    out.extend_from_slice(text.as_bytes());
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &b in name.as_bytes() {
        if (0x21..=0x7E).contains(&b) && !is_delimiter(b) && b != b'#' {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

/// Mostly-printable strings are written literally, binary ones as hex.
fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let binary = bytes
        .iter()
        .filter(|&&b| !(0x20..=0x7E).contains(&b) && !matches!(b, b'\n' | b'\r' | b'\t'))
        .count();
    if binary * 4 > bytes.len() {
        out.push(b'<');
        for b in bytes {
            out.extend_from_slice(format!("{b:02X}").as_bytes());
        }
        out.push(b'>');
        return;
    }

    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x20..=0x7E => out.push(b),
            _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
        }
    }
    out.push(b')');
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Cursor over a byte buffer.
///
/// Offsets reported in errors are absolute positions in the buffer.
#[derive(Clone, Debug)]
pub struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Start parsing at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> XrefError {
        XrefError::Syntax {
            offset: self.pos as u64,
            reason: reason.into(),
        }
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Read a run of regular characters. Empty at a delimiter or the end.
    pub fn read_token(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    /// Consume `keyword` (after whitespace) or fail without moving.
    pub fn expect_keyword(&mut self, keyword: &[u8]) -> XrefResult<()> {
        let saved = self.pos;
        self.skip_whitespace();
        if self.read_token() == keyword {
            Ok(())
        } else {
            self.pos = saved;
            Err(self.error(format!(
                "expected '{}'",
                String::from_utf8_lossy(keyword)
            )))
        }
    }

    /// Whether the next token is `keyword`. Never moves the cursor.
    pub fn peek_keyword(&mut self, keyword: &[u8]) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        let found = self.read_token() == keyword;
        self.pos = saved;
        found
    }

    /// Read an unsigned decimal integer token.
    pub fn read_unsigned(&mut self) -> XrefResult<u64> {
        self.skip_whitespace();
        let start = self.pos;
        let token = self.read_token();
        if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
            self.pos = start;
            return Err(self.error("expected an unsigned integer"));
        }
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| XrefError::Syntax {
                offset: start as u64,
                reason: "integer out of range".into(),
            })
    }

    /// Try to read an `N G obj` header. Restores the cursor on failure.
    pub fn try_object_header(&mut self) -> Option<ObjectRef> {
        let saved = self.pos;
        let header = self.object_header();
        if header.is_none() {
            self.pos = saved;
        }
        header
    }

    fn object_header(&mut self) -> Option<ObjectRef> {
        let number = u32::try_from(self.read_unsigned().ok()?).ok()?;
        let generation = u32::try_from(self.read_unsigned().ok()?).ok()?;
        self.expect_keyword(b"obj").ok()?;
        Some(ObjectRef::new(number, generation))
    }

    /// Parse `N G obj <payload> endobj`.
    pub fn parse_indirect(&mut self) -> XrefResult<(ObjectRef, Payload)> {
        self.skip_whitespace();
        let reference = self
            .try_object_header()
            .ok_or_else(|| self.error("expected object header"))?;
        let payload = self.parse_payload()?;
        self.expect_keyword(b"endobj")?;
        Ok((reference, payload))
    }

    /// Parse one direct payload.
    pub fn parse_payload(&mut self) -> XrefResult<Payload> {
        self.skip_whitespace();
        let Some(b) = self.peek() else {
            return Err(self.error("unexpected end of data"));
        };
        match b {
            b'/' => {
                self.pos += 1;
                Ok(Payload::Name(self.parse_name_body()))
            }
            b'(' => self.parse_literal_string(),
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                let dict = self.nested(Self::parse_dictionary)?;
                self.parse_stream_tail(dict)
            }
            b'<' => self.parse_hex_string(),
            b'[' => self.nested(Self::parse_array),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number_or_reference(),
            _ => {
                let start = self.pos;
                match self.read_token() {
                    b"null" => Ok(Payload::Null),
                    b"true" => Ok(Payload::Boolean(true)),
                    b"false" => Ok(Payload::Boolean(false)),
                    b"" => Err(self.error(format!("unexpected byte 0x{b:02X}"))),
                    other => {
                        let reason = format!("unknown keyword '{}'", String::from_utf8_lossy(other));
                        self.pos = start;
                        Err(self.error(reason))
                    }
                }
            }
        }
    }

    /// Run `parse` one container level deeper, failing past
    /// [`MAX_NESTING`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> XrefResult<T>) -> XrefResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("containers nested deeper than {MAX_NESTING}")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Parse `<< ... >>` without looking for a following stream.
    pub fn parse_dictionary(&mut self) -> XrefResult<Dictionary> {
        self.skip_whitespace();
        if !self.data[self.pos..].starts_with(b"<<") {
            return Err(self.error("expected '<<'"));
        }
        self.pos += 2;
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            if self.data[self.pos..].starts_with(b">>") {
                self.pos += 2;
                return Ok(dict);
            }
            match self.peek() {
                Some(b'/') => self.pos += 1,
                Some(_) => return Err(self.error("expected a name key")),
                None => return Err(self.error("unterminated dictionary")),
            }
            let key = self.parse_name_body();
            let value = self.parse_payload()?;
            dict.insert(key, value);
        }
    }

    fn parse_stream_tail(&mut self, dict: Dictionary) -> XrefResult<Payload> {
        if !self.peek_keyword(b"stream") {
            return Ok(Payload::Dictionary(dict));
        }
        self.expect_keyword(b"stream")?;
        if self.data[self.pos..].starts_with(b"\r\n") {
            self.pos += 2;
        } else if matches!(self.peek(), Some(b'\n' | b'\r')) {
            self.pos += 1;
        }
        let start = self.pos;

        let declared = dict
            .get("Length")
            .and_then(Payload::as_integer)
            .and_then(|len| usize::try_from(len).ok())
            .filter(|len| {
                let end = start.saturating_add(*len);
                end <= self.data.len() && {
                    let mut after = Parser::at(self.data, end);
                    after.peek_keyword(b"endstream")
                }
            });
        let end = match declared {
            Some(len) => start + len,
            None => {
                let found = find(&self.data[start..], b"endstream")
                    .ok_or_else(|| self.error("stream without 'endstream'"))?;
                let mut end = start + found;
                if end > start && self.data[end - 1] == b'\n' {
                    end -= 1;
                }
                if end > start && self.data[end - 1] == b'\r' {
                    end -= 1;
                }
                end
            }
        };

        let data = self.data[start..end].to_vec();
        self.pos = end;
        self.expect_keyword(b"endstream")?;
        Ok(Payload::Stream(Stream::new(dict, data)))
    }

    fn parse_array(&mut self) -> XrefResult<Payload> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Payload::Array(items));
                }
                Some(_) => items.push(self.parse_payload()?),
                None => return Err(self.error("unterminated array")),
            }
        }
    }

    /// Decode a name after its `/`. Bytes that are not UTF-8 are replaced
    /// with U+FFFD rather than failing the whole object.
    fn parse_name_body(&mut self) -> String {
        let raw = self.read_token();
        let mut decoded = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let Some(byte) = hex_pair(raw[i + 1], raw[i + 2]) {
                    decoded.push(byte);
                    i += 3;
                    continue;
                }
            }
            decoded.push(raw[i]);
            i += 1;
        }
        match String::from_utf8(decoded) {
            Ok(name) => name,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    fn parse_literal_string(&mut self) -> XrefResult<Payload> {
        self.pos += 1;
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Payload::String(out));
                    }
                    out.push(b);
                }
                b'\\' => self.parse_escape(&mut out),
                _ => out.push(b),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else {
            return;
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // Line continuation.
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }

    fn parse_hex_string(&mut self) -> XrefResult<Payload> {
        self.pos += 1;
        let mut digits = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated hex string"));
            };
            self.pos += 1;
            match b {
                b'>' => break,
                b if is_whitespace(b) => {}
                b if b.is_ascii_hexdigit() => digits.push(b),
                _ => return Err(self.error("invalid hex digit")),
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let bytes = digits
            .chunks(2)
            .filter_map(|pair| hex_pair(pair[0], pair[1]))
            .collect();
        Ok(Payload::String(bytes))
    }

    fn parse_number_or_reference(&mut self) -> XrefResult<Payload> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'+' | b'-' | b'.' | b'0'..=b'9')) {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.data[start..self.pos]).unwrap_or_default();

        if token.contains('.') {
            return token
                .parse::<f64>()
                .map(Payload::Real)
                .map_err(|_| XrefError::Syntax {
                    offset: start as u64,
                    reason: format!("invalid real '{token}'"),
                });
        }
        let value: i64 = token.parse().map_err(|_| XrefError::Syntax {
            offset: start as u64,
            reason: format!("invalid integer '{token}'"),
        })?;

        // `N G R` lookahead.
        if token.bytes().all(|b| b.is_ascii_digit()) {
            let saved = self.pos;
            if let Some(reference) = self.reference_tail(value) {
                return Ok(Payload::Reference(reference));
            }
            self.pos = saved;
        }
        Ok(Payload::Integer(value))
    }

    fn reference_tail(&mut self, number: i64) -> Option<ObjectRef> {
        let number = u32::try_from(number).ok()?;
        let generation = u32::try_from(self.read_unsigned().ok()?).ok()?;
        self.skip_whitespace();
        if self.read_token() != b"R" {
            return None;
        }
        Some(ObjectRef::new(number, generation))
    }
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// First position of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Last position of `needle` in `haystack`.
pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Payload {
        Parser::new(text.as_bytes()).parse_payload().unwrap()
    }

    fn text(payload: &Payload) -> String {
        String::from_utf8(encode_payload(payload)).unwrap()
    }

    // --- Serialization ---

    #[test]
    fn scalars_serialize() {
        assert_eq!(text(&Payload::Null), "null");
        assert_eq!(text(&Payload::Boolean(false)), "false");
        assert_eq!(text(&Payload::Integer(-17)), "-17");
        assert_eq!(text(&Payload::Real(2.0)), "2.0");
        assert_eq!(text(&Payload::Real(0.25)), "0.25");
        assert_eq!(text(&Payload::Real(1e16)), "10000000000000000.0");
        assert_eq!(text(&Payload::Real(f64::NAN)), "0.0");
        assert_eq!(text(&Payload::Reference(ObjectRef::new(12, 3))), "12 3 R");
    }

    #[test]
    fn names_escape_delimiters() {
        assert_eq!(text(&Payload::name("A B")), "/A#20B");
        assert_eq!(text(&Payload::name("x#y")), "/x#23y");
        assert_eq!(text(&Payload::name("Type")), "/Type");
    }

    #[test]
    fn strings_escape_parens() {
        assert_eq!(text(&Payload::string(b"a(b)c\\".to_vec())), "(a\\(b\\)c\\\\)");
        assert_eq!(text(&Payload::string(vec![0, 1, 2, 3])), "<00010203>");
    }

    #[test]
    fn dictionary_serializes_sorted() {
        let dict = Dictionary::new()
            .with("Type", Payload::name("Page"))
            .with("Count", 3i64);
        assert_eq!(text(&Payload::Dictionary(dict)), "<</Count 3 /Type /Page>>");
    }

    #[test]
    fn indirect_object_layout() {
        let mut out = Vec::new();
        write_indirect(&mut out, ObjectRef::new(4, 0), &Payload::Integer(9));
        assert_eq!(out, b"4 0 obj\n9\nendobj\n");
    }

    // --- Parsing ---

    #[test]
    fn parses_scalars() {
        assert_eq!(parse("null"), Payload::Null);
        assert_eq!(parse(" true"), Payload::Boolean(true));
        assert_eq!(parse("-42"), Payload::Integer(-42));
        assert_eq!(parse("+7"), Payload::Integer(7));
        assert_eq!(parse("-.5"), Payload::Real(-0.5));
        assert_eq!(parse("3."), Payload::Real(3.0));
    }

    #[test]
    fn parses_reference_with_lookahead() {
        assert_eq!(parse("5 0 R"), Payload::Reference(ObjectRef::new(5, 0)));
        assert_eq!(
            parse("[1 2 3 0 R 4]"),
            Payload::Array(vec![
                Payload::Integer(1),
                Payload::Reference(ObjectRef::new(2, 3)),
                Payload::Integer(4),
            ])
        );
        assert_eq!(
            parse("[1 2]"),
            Payload::Array(vec![Payload::Integer(1), Payload::Integer(2)])
        );
    }

    #[test]
    fn parses_names_with_hex_escapes() {
        assert_eq!(parse("/A#20B"), Payload::name("A B"));
        assert_eq!(parse("/Type/Page"), Payload::name("Type"));
    }

    #[test]
    fn non_utf8_names_decode_lossily() {
        assert_eq!(parse("/Caf#E9"), Payload::name("Caf\u{FFFD}"));
        let dict = parse("<</K#FF 1>>");
        assert_eq!(dict.as_dictionary().unwrap().get("K\u{FFFD}"), Some(&Payload::Integer(1)));
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let ok = format!("{}{}", "[".repeat(MAX_NESTING), "]".repeat(MAX_NESTING));
        assert!(Parser::new(ok.as_bytes()).parse_payload().is_ok());

        let deep = format!("{}{}", "[".repeat(MAX_NESTING + 1), "]".repeat(MAX_NESTING + 1));
        let err = Parser::new(deep.as_bytes()).parse_payload().unwrap_err();
        assert!(matches!(err, XrefError::Syntax { .. }));

        let dicts = "<</A ".repeat(MAX_NESTING + 1) + "1" + &">>".repeat(MAX_NESTING + 1);
        assert!(Parser::new(dicts.as_bytes()).parse_payload().is_err());
    }

    #[test]
    fn nesting_depth_resets_between_siblings() {
        let inner = format!("{}{}", "[".repeat(MAX_NESTING - 1), "]".repeat(MAX_NESTING - 1));
        let text = format!("[{inner} {inner} {inner}]");
        assert!(Parser::new(text.as_bytes()).parse_payload().is_ok());
    }

    #[test]
    fn parses_literal_string_escapes() {
        assert_eq!(parse("(a\\(b\\))"), Payload::string(b"a(b)".to_vec()));
        assert_eq!(parse("(x(y)z)"), Payload::string(b"x(y)z".to_vec()));
        assert_eq!(parse("(\\101\\n)"), Payload::string(b"A\n".to_vec()));
        assert_eq!(parse("(ab\\\ncd)"), Payload::string(b"abcd".to_vec()));
    }

    #[test]
    fn parses_hex_string() {
        assert_eq!(parse("<48 65 6C>"), Payload::string(b"Hel".to_vec()));
        assert_eq!(parse("<7>"), Payload::string(vec![0x70]));
    }

    #[test]
    fn parses_dictionary_with_comment() {
        let payload = parse("<< /Type /Catalog % root\n /Pages 2 0 R >>");
        let dict = payload.as_dictionary().unwrap();
        assert_eq!(dict.get("Type"), Some(&Payload::name("Catalog")));
        assert_eq!(dict.get_reference("Pages"), Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn parses_stream_with_declared_length() {
        let payload = parse("<</Length 5>>\nstream\nhello\nendstream");
        match payload {
            Payload::Stream(s) => assert_eq!(s.data, b"hello"),
            other => panic!("expected stream, got {other:?}"),
        }
    }

    #[test]
    fn parses_stream_with_wrong_length() {
        let payload = parse("<</Length 99>>\nstream\r\nhello\r\nendstream");
        match payload {
            Payload::Stream(s) => {
                assert_eq!(s.data, b"hello");
                assert_eq!(s.dict.get("Length"), Some(&Payload::Integer(5)));
            }
            other => panic!("expected stream, got {other:?}"),
        }
    }

    #[test]
    fn parses_indirect_object() {
        let mut parser = Parser::new(b"7 2 obj\n<</A [1 2.5]>>\nendobj\n");
        let (reference, payload) = parser.parse_indirect().unwrap();
        assert_eq!(reference, ObjectRef::new(7, 2));
        assert!(payload.as_dictionary().unwrap().contains_key("A"));
    }

    #[test]
    fn serialized_forms_parse_back() {
        let payload = Payload::Array(vec![
            Payload::Real(1.0),
            Payload::Real(-3.75),
            Payload::name("Odd Name/#"),
            Payload::string(b"line\nbreak (paren)".to_vec()),
            Payload::string(vec![0xFF, 0x00, 0x10]),
            Payload::Stream(Stream::new(
                Dictionary::new().with("Length", 3i64),
                b"a\nb".to_vec(),
            )),
            Payload::Reference(ObjectRef::new(3, 0)),
        ]);
        let bytes = encode_payload(&payload);
        let parsed = Parser::new(&bytes).parse_payload().unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn large_reals_stay_reals() {
        for value in [1e15, -1e16, 1e20, 1e300, 123456789012345680.0] {
            let bytes = encode_payload(&Payload::Real(value));
            assert_eq!(
                Parser::new(&bytes).parse_payload().unwrap(),
                Payload::Real(value),
                "{value}"
            );
        }
    }

    #[test]
    fn errors_carry_offsets() {
        let err = Parser::new(b"  [1 2").parse_payload().unwrap_err();
        assert!(matches!(err, XrefError::Syntax { .. }));

        let err = Parser::new(b"bogus").parse_payload().unwrap_err();
        match err {
            XrefError::Syntax { offset, reason } => {
                assert_eq!(offset, 0);
                assert!(reason.contains("bogus"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_object_header_restores_cursor() {
        let mut parser = Parser::new(b"12 0 xyz");
        assert!(parser.try_object_header().is_none());
        assert_eq!(parser.position(), 0);
    }
}
