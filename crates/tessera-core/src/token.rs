use crate::Result;

/// Two-delimiter token scanner used for `#{...}` placeholders and `${...}`
/// interpolations.
///
/// A backslash before the opening delimiter escapes it: `\#{x}` emits the
/// literal `#{x}`. Unclosed tokens are passed through verbatim.
pub struct TokenParser<'a> {
    open: &'a str,
    close: &'a str,
}

impl<'a> TokenParser<'a> {
    pub fn new(open: &'a str, close: &'a str) -> TokenParser<'a> {
        TokenParser { open, close }
    }

    pub fn placeholders() -> TokenParser<'static> {
        TokenParser {
            open: "#{",
            close: "}",
        }
    }

    pub fn interpolations() -> TokenParser<'static> {
        TokenParser {
            open: "${",
            close: "}",
        }
    }

    /// Scans `text`, replacing each token body through `handler`.
    pub fn parse(
        &self,
        text: &str,
        handler: &mut dyn FnMut(&str) -> Result<String>,
    ) -> Result<String> {
        let Some(mut start) = text.find(self.open) else {
            return Ok(text.to_string());
        };

        let mut out = String::with_capacity(text.len());
        let mut offset = 0;

        loop {
            if start > 0 && text[..start].ends_with('\\') {
                // Escaped open token: drop the backslash, keep the delimiter.
                out.push_str(&text[offset..start - 1]);
                out.push_str(self.open);
                offset = start + self.open.len();
            } else {
                out.push_str(&text[offset..start]);
                let body_start = start + self.open.len();
                match text[body_start..].find(self.close) {
                    Some(len) => {
                        let body = &text[body_start..body_start + len];
                        out.push_str(&handler(body)?);
                        offset = body_start + len + self.close.len();
                    }
                    None => {
                        // No closing delimiter: emit the rest untouched.
                        out.push_str(&text[start..]);
                        offset = text.len();
                    }
                }
            }

            match text[offset..].find(self.open) {
                Some(next) => start = offset + next,
                None => break,
            }
        }

        out.push_str(&text[offset..]);
        Ok(out)
    }
}

/// Returns `true` when `text` contains an unescaped `open` token.
pub fn contains_token(text: &str, open: &str) -> bool {
    let mut offset = 0;
    while let Some(found) = text[offset..].find(open) {
        let at = offset + found;
        if at == 0 || !text[..at].ends_with('\\') {
            return true;
        }
        offset = at + open.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(text: &str) -> String {
        TokenParser::placeholders()
            .parse(text, &mut |body| Ok(body.to_uppercase()))
            .unwrap()
    }

    #[test]
    fn replaces_tokens() {
        assert_eq!(upper("id = #{id}"), "id = ID");
        assert_eq!(upper("#{a} #{b}"), "A B");
        assert_eq!(upper("none"), "none");
    }

    #[test]
    fn escaped_open_is_literal() {
        assert_eq!(upper(r"\#{id}"), "#{id}");
        assert_eq!(upper(r"a \#{b} #{c}"), "a #{b} C");
    }

    #[test]
    fn unclosed_token_passes_through() {
        assert_eq!(upper("#{id"), "#{id");
        assert_eq!(upper("x #{a} #{b"), "x A #{b");
    }

    #[test]
    fn detects_tokens() {
        assert!(contains_token("select ${col}", "${"));
        assert!(!contains_token(r"select \${col}", "${"));
        assert!(!contains_token("select col", "${"));
    }
}
