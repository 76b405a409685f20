use std::{
	fmt::{self, Display},
	io::{self, Write},
	iter::Peekable,
	str::Chars
};

use indexmap::IndexMap;
use thiserror::Error;
use tryvial::try_fn;

type Result<T, E = KvError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
	#[error("unexpected end of input")]
	UnexpectedEnd,

	#[error("unexpected token {token:?} on line {line}")]
	UnexpectedToken { line: usize, token: String },

	#[error("unterminated string starting on line {0}")]
	UnterminatedString(usize),

	#[error("unmatched closing brace on line {0}")]
	UnexpectedCloseBrace(usize)
}

/// A value in a KeyValues document.
///
/// Parsed documents only ever contain `String` and `Block`; the typed variants exist for writing.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Clone, Debug, PartialEq)]
pub enum KvValue {
	String(String),
	Int(i64),
	Float(f64),
	Vector(Vec<f64>),
	Block(IndexMap<String, KvValue>)
}

impl KvValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::String(value) => value.trim().parse().ok(),
			Self::Int(value) => Some(*value as f64),
			Self::Float(value) => Some(*value),
			_ => None
		}
	}

	/// Integers written as floats ("1.0") are truncated.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::String(value) => {
				let value = value.trim();
				value
					.parse()
					.ok()
					.or_else(|| value.parse::<f64>().ok().map(|x| x as i64))
			}
			Self::Int(value) => Some(*value),
			Self::Float(value) => Some(*value as i64),
			_ => None
		}
	}

	pub fn as_block(&self) -> Option<&IndexMap<String, KvValue>> {
		match self {
			Self::Block(value) => Some(value),
			_ => None
		}
	}
}

impl Display for KvValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::String(value) => write!(f, "{value}"),
			Self::Int(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Vector(value) => write!(f, "{}", format_vector(value)),
			Self::Block(value) => {
				write!(f, "{{")?;

				for (key, value) in value {
					write!(f, " \"{key}\" \"{value}\"")?;
				}

				write!(f, " }}")
			}
		}
	}
}

impl From<&str> for KvValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_owned())
	}
}

impl From<String> for KvValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<i64> for KvValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for KvValue {
	fn from(value: i32) -> Self {
		Self::Int(value.into())
	}
}

impl From<bool> for KvValue {
	fn from(value: bool) -> Self {
		Self::Int(value.into())
	}
}

impl From<f64> for KvValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<Vec<f64>> for KvValue {
	fn from(value: Vec<f64>) -> Self {
		Self::Vector(value)
	}
}

impl From<IndexMap<String, KvValue>> for KvValue {
	fn from(value: IndexMap<String, KvValue>) -> Self {
		Self::Block(value)
	}
}

/// Format a sequence the way Source 2 material vectors are written: `[1 0.5 0]`.
pub fn format_vector<T: Display>(values: &[T]) -> String {
	format!(
		"[{}]",
		values.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
	)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
	Str { value: String, quoted: bool },
	Open,
	Close,

	/// Platform conditional such as `[$X360]` or `[!$WIN32 && !$X360]`, applying to the pair it follows.
	Conditional(String)
}

struct Lexer<'a> {
	chars: Peekable<Chars<'a>>,
	line: usize
}

impl<'a> Lexer<'a> {
	fn new(text: &'a str) -> Self {
		Self {
			chars: text.trim_start_matches('\u{feff}').chars().peekable(),
			line: 1
		}
	}

	fn next_token(&mut self) -> Result<Option<(Token, usize)>> {
		loop {
			let Some(&c) = self.chars.peek() else {
				return Ok(None);
			};

			match c {
				'\n' => {
					self.line += 1;
					self.chars.next();
				}

				c if c.is_whitespace() => {
					self.chars.next();
				}

				'{' => {
					self.chars.next();
					return Ok(Some((Token::Open, self.line)));
				}

				'}' => {
					self.chars.next();
					return Ok(Some((Token::Close, self.line)));
				}

				'"' => {
					let line = self.line;
					self.chars.next();

					let mut value = String::new();
					loop {
						match self.chars.next() {
							None => return Err(KvError::UnterminatedString(line)),
							Some('"') => break,
							Some(c) => {
								if c == '\n' {
									self.line += 1;
								}

								value.push(c);
							}
						}
					}

					return Ok(Some((Token::Str { value, quoted: true }, line)));
				}

				_ => {
					self.chars.next();

					// Line comment
					if c == '/' && self.chars.peek() == Some(&'/') {
						while self.chars.peek().is_some_and(|x| *x != '\n') {
							self.chars.next();
						}

						continue;
					}

					if c == '[' && matches!(self.chars.peek(), Some('$' | '!')) {
						let mut condition = String::from(c);
						while let Some(c) = self.chars.next_if(|x| *x != '\n') {
							condition.push(c);

							if c == ']' {
								break;
							}
						}

						return Ok(Some((Token::Conditional(condition), self.line)));
					}

					let mut value = String::from(c);
					while let Some(&c) = self.chars.peek() {
						if c.is_whitespace() || c == '{' || c == '}' || c == '"' || self.at_comment() {
							break;
						}

						value.push(c);
						self.chars.next();
					}

					return Ok(Some((Token::Str { value, quoted: false }, self.line)));
				}
			}
		}
	}

	fn at_comment(&self) -> bool {
		let mut ahead = self.chars.clone();
		ahead.next() == Some('/') && ahead.next() == Some('/')
	}
}

/// Platforms a converted material targets; every other platform conditional is false.
const PLATFORMS: [&str; 2] = ["WIN32", "WINDOWS"];

/// Evaluate a conditional like `[$WIN32 || !$X360]`. `&&` binds tighter than `||`.
fn evaluate_conditional(condition: &str) -> bool {
	let condition = condition.trim_start_matches('[').trim_end_matches(']');

	condition.split("||").any(|alternative| {
		alternative.split("&&").all(|term| {
			let term = term.trim();

			match term.strip_prefix('!') {
				Some(negated) => !is_platform(negated),
				None => is_platform(term)
			}
		})
	})
}

fn is_platform(name: &str) -> bool {
	let name = name.trim().trim_start_matches('$');
	PLATFORMS.iter().any(|platform| platform.eq_ignore_ascii_case(name))
}

/// Consume a conditional at `pos`, if there is one, and return whether it holds.
fn take_conditional(tokens: &[(Token, usize)], pos: &mut usize) -> bool {
	match tokens.get(*pos) {
		Some((Token::Conditional(condition), _)) => {
			*pos += 1;
			evaluate_conditional(condition)
		}

		_ => true
	}
}

/// Parse a KeyValues document into its top-level pairs.
///
/// Duplicate keys within a block keep the position of the first occurrence and the value of the last. Pairs guarded
/// by a platform conditional that does not hold on Windows are dropped.
#[try_fn]
pub fn parse(text: &str) -> Result<IndexMap<String, KvValue>> {
	let mut lexer = Lexer::new(text);
	let mut tokens = vec![];

	while let Some(token) = lexer.next_token()? {
		tokens.push(token);
	}

	let mut pos = 0;
	parse_block(&tokens, &mut pos, true)?
}

#[try_fn]
fn parse_block(tokens: &[(Token, usize)], pos: &mut usize, top_level: bool) -> Result<IndexMap<String, KvValue>> {
	let mut block = IndexMap::new();

	loop {
		let key = match tokens.get(*pos) {
			None if top_level => break,
			None => return Err(KvError::UnexpectedEnd),

			Some((Token::Close, line)) => {
				if top_level {
					return Err(KvError::UnexpectedCloseBrace(*line));
				}

				*pos += 1;
				break;
			}

			Some((Token::Open, line)) => {
				return Err(KvError::UnexpectedToken {
					line: *line,
					token: "{".into()
				});
			}

			Some((Token::Str { value, .. }, _)) => value.to_owned(),

			Some((Token::Conditional(condition), line)) => {
				return Err(KvError::UnexpectedToken {
					line: *line,
					token: condition.to_owned()
				});
			}
		};

		*pos += 1;

		let mut enabled = take_conditional(tokens, pos);

		let value = match tokens.get(*pos) {
			None => return Err(KvError::UnexpectedEnd),

			Some((Token::Open, _)) => {
				*pos += 1;
				KvValue::Block(parse_block(tokens, pos, false)?)
			}

			Some((Token::Str { value, .. }, _)) => {
				*pos += 1;
				KvValue::String(value.to_owned())
			}

			Some((Token::Close, line)) => {
				return Err(KvError::UnexpectedToken {
					line: *line,
					token: "}".into()
				});
			}

			Some((Token::Conditional(condition), line)) => {
				return Err(KvError::UnexpectedToken {
					line: *line,
					token: condition.to_owned()
				});
			}
		};

		enabled &= take_conditional(tokens, pos);

		if enabled {
			block.insert(key, value);
		}
	}

	block
}

/// Writes KeyValues text. Every scalar is quoted; blocks are indented with tabs.
pub struct KvWriter<W: Write> {
	writer: W
}

impl<W: Write> KvWriter<W> {
	pub fn new(writer: W) -> Self {
		Self { writer }
	}

	/// Write a named block, e.g. `("Layer0", params)`.
	pub fn write_block(&mut self, key: &str, block: &IndexMap<String, KvValue>) -> io::Result<()> {
		self.write_block_at(key, block, 0)
	}

	pub fn into_inner(self) -> W {
		self.writer
	}

	fn write_block_at(&mut self, key: &str, block: &IndexMap<String, KvValue>, depth: usize) -> io::Result<()> {
		let indent = "\t".repeat(depth);

		writeln!(self.writer, "{indent}\"{key}\"")?;
		writeln!(self.writer, "{indent}{{")?;

		for (key, value) in block {
			self.write_pair(key, value, depth + 1)?;
		}

		writeln!(self.writer, "{indent}}}")
	}

	fn write_pair(&mut self, key: &str, value: &KvValue, depth: usize) -> io::Result<()> {
		match value {
			KvValue::Block(block) => self.write_block_at(key, block, depth),
			scalar => writeln!(self.writer, "{}\"{key}\"\t\"{scalar}\"", "\t".repeat(depth))
		}
	}
}

/// Write a texture compile settings block.
///
/// Values are written unquoted and nothing is escaped, so keys or values containing quotes, braces or tabs produce
/// text that does not parse back to the same pairs.
pub fn write_settings<W: Write>(mut writer: W, props: &IndexMap<String, KvValue>) -> io::Result<()> {
	writer.write_all(b"\"settings\"\n{\n")?;

	for (key, value) in props {
		writeln!(writer, "\t\"{key}\"\t{value}")?;
	}

	writer.write_all(b"}\n")
}
