//! Text encoding of compositions
//!
//! A composition travels as a flat list of invocations, each terminated by `;`:
//!
//! ```text
//! {out=k}=127.0.0.1:8000/util.Scaler::__construct({i1=3});{out=y}=k::transform({i1=x});
//! ```
//!
//! Output bindings (formal output to variable) come first, input bindings
//! (formal input to literal or variable) second. String literals are quoted,
//! with `"` and `\` escaped by a backslash.

use crate::composition::model::{is_name_char, is_numeric_literal, ArgToken, Composition, Invocation, Operation};
use crate::error::{ChoreoError, Result};
use std::collections::HashMap;

/// Encode a composition into its canonical text form
pub fn encode(composition: &Composition) -> String {
    let mut out = String::new();
    for invocation in composition {
        encode_invocation(invocation, &mut out);
    }
    out
}

fn encode_invocation(invocation: &Invocation, out: &mut String) {
    out.push('{');
    for (i, (formal, variable)) in invocation.outputs().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(formal);
        out.push('=');
        out.push_str(variable);
    }
    out.push_str("}=");
    out.push_str(invocation.operation().name());
    out.push_str("({");
    for (i, (formal, token)) in invocation.arguments().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(formal);
        out.push('=');
        match token {
            ArgToken::Number(raw) | ArgToken::Variable(raw) => out.push_str(raw),
            ArgToken::Text(text) => {
                out.push('"');
                for c in text.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }
    out.push_str("});");
}

/// Decode a composition from its text form
pub fn decode(text: &str) -> Result<Composition> {
    let mut parser = Parser::new(text);
    let mut composition = Composition::new();

    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        composition.push(parser.invocation()?);
        parser.skip_whitespace();
        parser.expect(';')?;
    }

    Ok(composition)
}

/// Decode a composition together with the cursor that travels beside it
pub fn decode_with_cursor(text: &str, cursor: &str) -> Result<(Composition, usize)> {
    let composition = decode(text)?;
    let cursor: usize = cursor
        .trim()
        .parse()
        .map_err(|_| ChoreoError::MalformedComposition(format!("invalid cursor '{}'", cursor)))?;
    if cursor > composition.len() {
        return Err(ChoreoError::MalformedComposition(format!(
            "cursor {} is beyond the {} invocations of the composition",
            cursor,
            composition.len()
        )));
    }
    Ok((composition, cursor))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn error(&self, what: &str) -> ChoreoError {
        ChoreoError::MalformedComposition(format!("{} at offset {}", what, self.pos))
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", expected))),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn name(&mut self) -> Result<String> {
        let name = self.take_while(is_name_char);
        if name.is_empty() {
            return Err(self.error("expected a name"));
        }
        Ok(name)
    }

    fn quoted(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => text.push(c),
                    _ => return Err(self.error("invalid escape in string literal")),
                },
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn token(&mut self) -> Result<ArgToken> {
        if self.peek() == Some('"') {
            return Ok(ArgToken::Text(self.quoted()?));
        }
        let raw = self.name()?;
        if is_numeric_literal(&raw) {
            Ok(ArgToken::Number(raw))
        } else {
            Ok(ArgToken::Variable(raw))
        }
    }

    /// `name=token` pairs up to the closing brace
    fn bindings<T>(&mut self, value: impl Fn(&mut Self) -> Result<T>) -> Result<Vec<(String, T)>> {
        let mut bindings = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(bindings);
        }
        loop {
            self.skip_whitespace();
            let name = self.name()?;
            self.skip_whitespace();
            self.expect('=')?;
            self.skip_whitespace();
            bindings.push((name, value(self)?));
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(bindings),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected ',' or '}'"));
                }
            }
        }
    }

    fn invocation(&mut self) -> Result<Invocation> {
        self.expect('{')?;
        let outputs = self.bindings(|p| p.name())?;
        self.skip_whitespace();
        self.expect('=')?;
        self.skip_whitespace();

        let op_name = self.take_while(|c| c != '(' && is_name_char(c));
        if op_name.is_empty() {
            return Err(self.error("expected an operation name"));
        }

        self.skip_whitespace();
        self.expect('(')?;
        self.skip_whitespace();
        self.expect('{')?;
        let inputs = self.bindings(|p| p.token())?;
        self.skip_whitespace();
        self.expect(')')?;

        let operation = Operation::new(
            op_name,
            inputs.iter().map(|(formal, _)| formal.clone()).collect(),
            outputs.iter().map(|(formal, _)| formal.clone()).collect(),
        )?;
        let input_mapping: HashMap<String, ArgToken> = inputs.into_iter().collect();
        let output_mapping: HashMap<String, String> = outputs.into_iter().collect();
        Invocation::new(operation, input_mapping, output_mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Composition {
        Composition::new()
            .with(
                Invocation::builder("127.0.0.1:8000/util.Scaler::__construct")
                    .input("i1", "3")
                    .output("out", "k")
                    .build()
                    .unwrap(),
            )
            .with(
                Invocation::builder("k::transform")
                    .input("i1", "x")
                    .output("out", "y")
                    .build()
                    .unwrap(),
            )
            .with(
                Invocation::builder("10.0.0.2:9000/util.Buffer/abc::append")
                    .input("i1", "buf")
                    .input("i2", "\"a, \\\"quoted\\\" (text);\"")
                    .output("out", "r")
                    .output("out2", "buf2")
                    .build()
                    .unwrap(),
            )
    }

    #[test]
    fn test_encode_canonical_form() {
        let text = encode(&sample());
        assert!(text.starts_with("{out=k}=127.0.0.1:8000/util.Scaler::__construct({i1=3});"));
        assert!(text.contains("{out=y}=k::transform({i1=x});"));
        assert!(text.ends_with(";"));
    }

    #[test]
    fn test_round_trip_preserves_order_and_bindings() {
        let composition = sample();
        let decoded = decode(&encode(&composition)).unwrap();
        assert_eq!(decoded, composition);
        assert_eq!(encode(&decoded), encode(&composition));
    }

    #[test]
    fn test_decode_tolerates_whitespace() {
        let text = "{ out = k } = h:1/K::__construct ( { i1 = 5 , i2 = \"s\" } ) ;\n{}=k::reset({});";
        let composition = decode(text).unwrap();
        assert_eq!(composition.len(), 2);
        let first = composition.get(0).unwrap();
        let args: Vec<_> = first.arguments().collect();
        assert_eq!(args[0], ("i1", &ArgToken::Number("5".to_string())));
        assert_eq!(args[1], ("i2", &ArgToken::Text("s".to_string())));
        assert_eq!(composition.get(1).unwrap().operation().outputs().len(), 0);
    }

    #[test]
    fn test_empty_composition() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(encode(&Composition::new()), "");
    }

    #[test]
    fn test_malformed_inputs_are_rejected() {
        let cases = [
            "{out=k}=h:1/K::__construct({i1=5})",
            "{out=k}h:1/K::__construct({i1=5});",
            "{out=k}=h:1/K::__construct({i1=\"open});",
            "{out=k}=host/K::method({});",
            "{out=k}=h:1/K::__construct({i1=5,i1=6});",
            "{out=k}=h:1/K::__construct({i1});",
            "garbage",
        ];
        for case in cases {
            assert!(
                matches!(decode(case), Err(ChoreoError::MalformedComposition(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_decode_with_cursor() {
        let text = encode(&sample());
        let (composition, cursor) = decode_with_cursor(&text, "2").unwrap();
        assert_eq!(composition.len(), 3);
        assert_eq!(cursor, 2);

        assert!(decode_with_cursor(&text, "4").is_err());
        assert!(decode_with_cursor(&text, "-1").is_err());
        assert!(decode_with_cursor(&text, "two").is_err());
    }
}
