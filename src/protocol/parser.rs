//! Line parser
//!
//! Turns one whitespace-separated request line into a [`Command`].

use crate::error::{RelayError, Result};
use super::response::NOT_FOUND_LINE;
use super::Command;

const MIN_TOKENS: usize = 2;
const MAX_TOKENS: usize = 3;

/// Parse `GET name`, `SET name value` or `DEL name`
///
/// A token count outside 2..=3 or an unrecognised verb is an
/// `UnknownCommand`; a known verb with the wrong number of arguments is an
/// `InvalidCommand`. A value spelled `NOT_FOUND` is refused, since a GET
/// reply could not tell it apart from a missing key.
pub fn parse_line(line: &str) -> Result<Command> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if tokens.len() < MIN_TOKENS || tokens.len() > MAX_TOKENS {
        return Err(RelayError::UnknownCommand(line.trim().to_string()));
    }

    let verb = tokens[0];
    let args = &tokens[1..];

    if verb.eq_ignore_ascii_case("GET") {
        match args {
            [key] => Ok(Command::get(key.as_bytes())),
            _ => Err(arg_count("GET", 1, args.len())),
        }
    } else if verb.eq_ignore_ascii_case("SET") {
        match args {
            [_, value] if *value == NOT_FOUND_LINE => Err(RelayError::InvalidCommand(
                format!("{} is reserved and cannot be stored as a value", NOT_FOUND_LINE),
            )),
            [key, value] => Ok(Command::set(key.as_bytes(), value.as_bytes())),
            _ => Err(arg_count("SET", 2, args.len())),
        }
    } else if verb.eq_ignore_ascii_case("DEL") {
        match args {
            [key] => Ok(Command::delete(key.as_bytes())),
            _ => Err(arg_count("DEL", 1, args.len())),
        }
    } else {
        Err(RelayError::UnknownCommand(verb.to_string()))
    }
}

fn arg_count(verb: &str, expected: usize, got: usize) -> RelayError {
    RelayError::InvalidCommand(format!(
        "{} takes {} argument(s), got {}",
        verb, expected, got
    ))
}
