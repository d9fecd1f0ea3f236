//! JSON with comments and trailing commas, as found in tsconfig.json files.

use serde_json::Value;

/// Parse JSONC text into a JSON value.
///
/// Error line/column refer to the original text.
pub fn parse(input: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&strip(input))
}

/// Remove comments and trailing commas.
///
/// Newlines inside comments are kept and a removed trailing comma becomes a
/// space, so positions in the result line up with the input.
pub fn strip(input: &str) -> String {
    strip_trailing_commas(&strip_json_comments(input))
}

/// Strip single-line and multi-line comments from JSON.
fn strip_json_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if in_string {
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    for nc in chars.by_ref() {
                        if nc == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    while let Some(nc) = chars.next() {
                        if nc == '\n' {
                            result.push('\n');
                        } else if nc == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => result.push(c),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Strip trailing commas from JSON arrays and objects.
fn strip_trailing_commas(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if in_string {
            result.push(c);
            continue;
        }

        if c == ',' {
            let is_trailing = chars
                .clone()
                .find(|nc| !nc.is_whitespace())
                .is_some_and(|nc| nc == ']' || nc == '}');
            result.push(if is_trailing { ' ' } else { c });
        } else {
            result.push(c);
        }
    }

    result
}
