//! Classification of a token sequence into the shape of the command it describes.
//!
//! The grammar is deliberately tiny: a line is either a plain command, a command
//! with one input and/or one output redirection, or a pipeline of plain commands.
//! The classifier walks the tokens once, left to right, and stops at the first
//! violation of that grammar.

use std::fmt;
use std::path::{Path, PathBuf};

/// Upper bound on pipeline stages when no configuration overrides it.
pub const DEFAULT_MAX_PIPELINE_STAGES: usize = 256;

/// An operator recognised by the classifier. Operators must stand alone as a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// The pipe operator, `|`.
    Pipe,
}

impl Operator {
    /// Recognises a whole token as an operator.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Operator::RedirectIn),
            ">" => Some(Operator::RedirectOut),
            "|" => Some(Operator::Pipe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::RedirectIn => "<",
            Operator::RedirectOut => ">",
            Operator::Pipe => "|",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token built only from operator characters, e.g. `<<`, `>>` or `||`.
fn looks_like_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| matches!(c, '<' | '>' | '|'))
}

/// Reasons a line is rejected by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// Two `<` operators on the same line.
    DuplicateInput,
    /// Two `>` operators on the same line.
    DuplicateOutput,
    /// A redirection and a pipe on the same line.
    RedirectWithPipe,
    /// An operator at the end of the line or directly followed by another operator.
    MissingOperand(Operator),
    /// A command segment without any word in it.
    EmptySegment,
    /// A token such as `>>` that only consists of operator characters.
    UnsupportedOperator(String),
    /// A word following the file name of a redirection.
    UnexpectedWord(String),
    /// The pipeline is longer than the configured limit.
    TooManyStages(usize),
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingError::DuplicateInput => write!(f, "more than one input redirection"),
            ParsingError::DuplicateOutput => write!(f, "more than one output redirection"),
            ParsingError::RedirectWithPipe => {
                write!(f, "redirections cannot be combined with pipes")
            }
            ParsingError::MissingOperand(Operator::Pipe) => {
                write!(f, "missing command after `|`")
            }
            ParsingError::MissingOperand(op) => write!(f, "missing file name after `{op}`"),
            ParsingError::EmptySegment => write!(f, "empty command"),
            ParsingError::UnsupportedOperator(token) => {
                write!(f, "unsupported operator `{token}`")
            }
            ParsingError::UnexpectedWord(word) => {
                write!(f, "unexpected `{word}` after redirection target")
            }
            ParsingError::TooManyStages(max) => {
                write!(f, "pipeline has more than {max} stages")
            }
        }
    }
}

impl std::error::Error for ParsingError {}

/// Structural category of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// No operators at all.
    Plain,
    /// `cmd < in`
    RedirectIn,
    /// `cmd > out`
    RedirectOut,
    /// `cmd > out < in`
    RedirectOutIn,
    /// `cmd < in > out`
    RedirectInOut,
    /// `cmd1 | cmd2 | ...` with the number of stages.
    Pipeline(usize),
    /// The line breaks the grammar.
    Invalid(ParsingError),
}

impl Shape {
    fn has_input(&self) -> bool {
        matches!(
            self,
            Shape::RedirectIn | Shape::RedirectOutIn | Shape::RedirectInOut
        )
    }

    fn has_output(&self) -> bool {
        matches!(
            self,
            Shape::RedirectOut | Shape::RedirectOutIn | Shape::RedirectInOut
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Shape::Invalid(_))
    }

    /// The shape reached after seeing `op` in this shape.
    fn after(&self, op: Operator) -> Shape {
        match (op, self) {
            (_, Shape::Invalid(err)) => Shape::Invalid(err.clone()),
            (Operator::RedirectIn | Operator::RedirectOut, Shape::Pipeline(_)) => {
                Shape::Invalid(ParsingError::RedirectWithPipe)
            }
            (Operator::RedirectIn, shape) if shape.has_input() => {
                Shape::Invalid(ParsingError::DuplicateInput)
            }
            (Operator::RedirectIn, Shape::RedirectOut) => Shape::RedirectOutIn,
            (Operator::RedirectIn, _) => Shape::RedirectIn,
            (Operator::RedirectOut, shape) if shape.has_output() => {
                Shape::Invalid(ParsingError::DuplicateOutput)
            }
            (Operator::RedirectOut, Shape::RedirectIn) => Shape::RedirectInOut,
            (Operator::RedirectOut, _) => Shape::RedirectOut,
            (Operator::Pipe, Shape::Plain) => Shape::Pipeline(2),
            (Operator::Pipe, Shape::Pipeline(stages)) => Shape::Pipeline(stages + 1),
            (Operator::Pipe, _) => Shape::Invalid(ParsingError::RedirectWithPipe),
        }
    }
}

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub shape: Shape,
    /// Index of the token right after every operator seen; the first entry is always 0.
    pub segment_starts: Vec<usize>,
    /// File name following `<`, if any.
    pub input: Option<String>,
    /// File name following `>`, if any.
    pub output: Option<String>,
}

/// A file redirection applied to a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    Input(PathBuf),
    Output(PathBuf),
}

impl Redirect {
    /// The file named by the redirection.
    pub fn path(&self) -> &Path {
        match self {
            Redirect::Input(path) | Redirect::Output(path) => path,
        }
    }
}

/// A validated command, ready to be handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A single program with its arguments.
    Simple(Vec<String>),
    /// A single program whose streams are redirected, in textual order.
    Redirected {
        argv: Vec<String>,
        redirects: Vec<Redirect>,
    },
    /// Two or more programs, each one feeding the next.
    Pipeline(Vec<Vec<String>>),
}

impl Classification {
    /// Turns the classification of `tokens` into a [`Command`].
    ///
    /// `tokens` must be the same sequence that was classified.
    pub fn into_command(self, mut tokens: Vec<String>) -> Result<Command, ParsingError> {
        let redirects = match self.shape {
            Shape::Invalid(err) => return Err(err),
            Shape::Plain if tokens.is_empty() => return Err(ParsingError::EmptySegment),
            Shape::Plain => return Ok(Command::Simple(tokens)),
            Shape::Pipeline(_) => {
                let ends = self
                    .segment_starts
                    .iter()
                    .skip(1)
                    .map(|start| start - 1)
                    .chain(std::iter::once(tokens.len()));
                let stages = self
                    .segment_starts
                    .iter()
                    .zip(ends)
                    .map(|(&start, end)| tokens[start..end].to_vec())
                    .collect();
                return Ok(Command::Pipeline(stages));
            }
            Shape::RedirectIn => vec![input_of(self.input)?],
            Shape::RedirectOut => vec![output_of(self.output)?],
            Shape::RedirectInOut => vec![input_of(self.input)?, output_of(self.output)?],
            Shape::RedirectOutIn => vec![output_of(self.output)?, input_of(self.input)?],
        };

        // Everything from the first operator on is operators and file names.
        let first_operator = self
            .segment_starts
            .get(1)
            .map(|start| start - 1)
            .ok_or(ParsingError::EmptySegment)?;
        tokens.truncate(first_operator);
        if tokens.is_empty() {
            return Err(ParsingError::EmptySegment);
        }
        Ok(Command::Redirected {
            argv: tokens,
            redirects,
        })
    }
}

fn input_of(name: Option<String>) -> Result<Redirect, ParsingError> {
    name.map(|n| Redirect::Input(PathBuf::from(n)))
        .ok_or(ParsingError::MissingOperand(Operator::RedirectIn))
}

fn output_of(name: Option<String>) -> Result<Redirect, ParsingError> {
    name.map(|n| Redirect::Output(PathBuf::from(n)))
        .ok_or(ParsingError::MissingOperand(Operator::RedirectOut))
}

/// Single-pass classifier over a token sequence.
#[derive(Debug, Clone)]
pub struct Classifier {
    max_stages: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIPELINE_STAGES)
    }
}

impl Classifier {
    /// Create a classifier accepting pipelines of at most `max_stages` stages.
    pub fn new(max_stages: usize) -> Self {
        Self { max_stages }
    }

    /// Classifies `tokens`, stopping at the first grammar violation.
    pub fn classify<S: AsRef<str>>(&self, tokens: &[S]) -> Classification {
        let mut shape = Shape::Plain;
        let mut segment_starts = vec![0];
        let mut input = None;
        let mut output = None;
        let mut segment_start = 0;
        // Set once a redirection target was consumed: only operators may follow.
        let mut after_target = false;

        let mut pos = 0;
        while pos < tokens.len() {
            let token = tokens[pos].as_ref();
            let Some(op) = Operator::from_token(token) else {
                if looks_like_operator(token) {
                    shape = Shape::Invalid(ParsingError::UnsupportedOperator(token.to_owned()));
                    break;
                }
                if after_target {
                    shape = Shape::Invalid(ParsingError::UnexpectedWord(token.to_owned()));
                    break;
                }
                pos += 1;
                continue;
            };

            shape = shape.after(op);
            if shape.is_invalid() {
                break;
            }
            if pos == segment_start {
                shape = Shape::Invalid(ParsingError::EmptySegment);
                break;
            }
            let operand: Option<&str> = tokens.get(pos + 1).map(|t| t.as_ref());
            let Some(operand) = operand.filter(|t| !looks_like_operator(t)) else {
                shape = Shape::Invalid(ParsingError::MissingOperand(op));
                break;
            };
            if let Shape::Pipeline(stages) = shape {
                if stages > self.max_stages {
                    shape = Shape::Invalid(ParsingError::TooManyStages(self.max_stages));
                    break;
                }
            }
            segment_starts.push(pos + 1);

            match op {
                Operator::RedirectIn => input = Some(operand.to_owned()),
                Operator::RedirectOut => output = Some(operand.to_owned()),
                Operator::Pipe => {
                    segment_start = pos + 1;
                    pos += 1;
                    continue;
                }
            }
            after_target = true;
            pos += 2;
        }

        Classification {
            shape,
            segment_starts,
            input,
            output,
        }
    }
}
