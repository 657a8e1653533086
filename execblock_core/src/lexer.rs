use logos::Logos;
use snailquote::unescape;

use crate::ExecBlockError;
use crate::ExecBlockResult;

/// Raw tokens produced by logos for the info string of a fenced block.
#[derive(Logos, Debug, PartialEq)]
enum RawToken {
	#[token("=")]
	Equals,
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'[^']*'")]
	SingleQuotedString,
	#[regex(r#"[^ \t\r\n="']+"#)]
	Word,
}

/// A single item of a directive info string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoItem {
	/// A bare word or quoted string, e.g. `python` or `linenos`.
	Bare(String),
	/// A `name=value` pair, e.g. `lineno-start=5` or `caption="Example"`.
	Pair { name: String, value: String },
}

/// Walks the logos token stream and groups tokens into [`InfoItem`]s.
struct InfoWalker<'a> {
	source: &'a str,
	raw_tokens: Vec<(Result<RawToken, ()>, std::ops::Range<usize>)>,
	cursor: usize,
	items: Vec<InfoItem>,
}

impl<'a> InfoWalker<'a> {
	fn new(source: &'a str) -> Self {
		let raw_tokens: Vec<_> = RawToken::lexer(source).spanned().collect();

		Self {
			source,
			raw_tokens,
			cursor: 0,
			items: vec![],
		}
	}

	fn malformed(&self) -> ExecBlockError {
		ExecBlockError::MalformedArguments(self.source.to_string())
	}

	fn current(&self) -> Option<&Result<RawToken, ()>> {
		self.raw_tokens.get(self.cursor).map(|(token, _)| token)
	}

	fn current_slice(&self) -> &'a str {
		let (_, span) = &self.raw_tokens[self.cursor];
		&self.source[span.clone()]
	}

	/// Read the value at the cursor (word or quoted string) and advance.
	fn take_value(&mut self) -> ExecBlockResult<String> {
		let value = match self.current() {
			Some(Ok(RawToken::Word)) => self.current_slice().to_string(),
			Some(Ok(RawToken::SingleQuotedString)) => {
				let slice = self.current_slice();
				slice[1..slice.len() - 1].to_string()
			}
			Some(Ok(RawToken::DoubleQuotedString)) => {
				let slice = self.current_slice();
				if slice.contains('\\') {
					unescape(slice).map_err(|_| self.malformed())?
				} else {
					slice[1..slice.len() - 1].to_string()
				}
			}
			_ => return Err(self.malformed()),
		};

		self.cursor += 1;
		Ok(value)
	}

	fn process(mut self) -> ExecBlockResult<Vec<InfoItem>> {
		while let Some(token) = self.current() {
			match token {
				Ok(RawToken::Whitespace) => {
					self.cursor += 1;
				}
				Ok(RawToken::Word) => {
					let name = self.take_value()?;
					if matches!(self.current(), Some(Ok(RawToken::Equals))) {
						self.cursor += 1;
						let value = self.take_value()?;
						self.items.push(InfoItem::Pair { name, value });
					} else {
						self.items.push(InfoItem::Bare(name));
					}
				}
				Ok(RawToken::SingleQuotedString | RawToken::DoubleQuotedString) => {
					let value = self.take_value()?;
					self.items.push(InfoItem::Bare(value));
				}
				Ok(RawToken::Equals) | Err(()) => return Err(self.malformed()),
			}
		}

		Ok(self.items)
	}
}

/// Split a fenced block info string into bare words and `name=value` pairs.
pub fn tokenize_info(info: &str) -> ExecBlockResult<Vec<InfoItem>> {
	InfoWalker::new(info).process()
}
