//! Token stream over Praat text files.
//!
//! Both the long ("full") and the short text format reduce to the same
//! sequence of strings and numbers once the labels (`xmin =`, `intervals:`),
//! bracketed indices (`[3]`) and existence flags (`<exists>`) are dropped.

/// A meaningful token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Num(f64),
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Str(s) => format!("string \"{s}\""),
            Token::Num(n) => format!("number {n}"),
        }
    }
}

/// Iterator over the strings and numbers of a Praat text file.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Read a quoted string; `""` inside the quotes is a literal quote.
    /// An unterminated string runs to end of input.
    fn read_string(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == '"' {
                if self.peek_char() == Some('"') {
                    self.bump();
                    out.push('"');
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn skip_until(&mut self, end: char) {
        while let Some(c) = self.bump() {
            if c == end {
                break;
            }
        }
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || c == '"' || c == '[' {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let c = self.peek_char()?;
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            match c {
                '"' => {
                    self.bump();
                    return Some(Token::Str(self.read_string()));
                }
                '[' => self.skip_until(']'),
                '!' => self.skip_until('\n'),
                _ => {
                    let word = self.read_word();
                    if word.is_empty() {
                        // Lone delimiter we do not understand; step over it.
                        self.bump();
                        continue;
                    }
                    if let Some(n) = parse_number(word) {
                        return Some(Token::Num(n));
                    }
                }
            }
        }
    }
}

fn parse_number(word: &str) -> Option<f64> {
    let first = word.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    word.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src).collect()
    }

    #[test]
    fn test_long_format_labels_are_dropped() {
        let src = "xmin = 0 \nxmax = 1.5 \ntiers? <exists> \nsize = 2 \nitem []: \n    item [1]:\n";
        assert_eq!(
            tokens(src),
            vec![Token::Num(0.0), Token::Num(1.5), Token::Num(2.0)]
        );
    }

    #[test]
    fn test_escaped_quotes_and_multiline_labels() {
        let src = "text = \"say \"\"hi\"\"\nthere\"";
        assert_eq!(tokens(src), vec![Token::Str("say \"hi\"\nthere".to_string())]);
    }

    #[test]
    fn test_brackets_inside_strings_are_kept() {
        let src = "text = \"a[1]\" intervals [2]:";
        assert_eq!(tokens(src), vec![Token::Str("a[1]".to_string())]);
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(tokens("1e-3 -2.5E2"), vec![Token::Num(0.001), Token::Num(-250.0)]);
    }

    #[test]
    fn test_words_that_look_like_signs_are_ignored() {
        assert_eq!(tokens("- + = :"), Vec::<Token>::new());
    }
}
