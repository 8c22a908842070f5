//! A module implementing lexical analysis (tokenization) of one input line.
//!
//! The shell language has no quoting, escaping or substitutions: a token is a
//! maximal run of non-whitespace characters. Operators are only recognised later,
//! by the parser, when they stand alone as a whole token.

/// Splits a line into its whitespace-delimited tokens.
///
/// Consecutive whitespace (spaces, tabs, the trailing newline) collapses into a
/// single delimiter, so an empty or blank line yields no tokens.
///
/// # Arguments
/// * `line` - The raw text read from the user.
///
/// # Returns
/// The tokens in the order they appear in `line`.
pub fn split_into_tokens(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}
