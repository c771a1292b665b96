//! # FHIRPath String Functions
//!
//! Implements the string manipulation functions: searching (`indexOf`,
//! `lastIndexOf`, `startsWith`, `endsWith`, `contains`), slicing
//! (`substring`, `toChars`, `split`, `trim`), case mapping, replacement,
//! regular expressions (`matches`, `matchesFull`, `replaceMatches`),
//! `join`, and the `encode`/`decode` and `escape`/`unescape` pairs.
//!
//! Positions and lengths count Unicode scalar values. Empty input or an
//! empty argument yields empty.

use atrius_fhirpath_support::{Collection, Element, EvaluationError, EvaluationResult, Value};
use base64::{Engine as _, engine::general_purpose};
use regex::{Regex, RegexBuilder};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

/// The input as a String; `None` for empty input.
fn string_input(site: &CallSite<'_>) -> Result<Option<String>, EvaluationError> {
    match site.singleton_input()? {
        None => Ok(None),
        Some(value) => value.to_string_value(false)?.map(Some).ok_or_else(|| {
            EvaluationError::TypeError(format!(
                "{}() can only be applied to String values, got {}",
                site.name,
                value.type_name()
            ))
        }),
    }
}

fn string_result(value: Option<String>) -> EvaluationResult {
    value
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty)
}

fn char_count(s: &str) -> Result<i32, EvaluationError> {
    i32::try_from(s.chars().count()).map_err(|_| EvaluationError::ArithmeticOverflow)
}

/// Char position of a byte offset into `s`.
fn char_position(s: &str, byte_offset: usize) -> Result<i32, EvaluationError> {
    char_count(&s[..byte_offset])
}

/// Builds the pattern used by `matches` and friends. `.` matches newlines;
/// `flags` may add `i` (case-insensitive) and `m` (multi-line).
fn compile(pattern: &str, flags: Option<&str>) -> Result<Regex, EvaluationError> {
    let flags = flags.unwrap_or("");
    RegexBuilder::new(pattern)
        .dot_matches_new_line(true)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .build()
        .map_err(|e| EvaluationError::InvalidRegex(e.to_string()))
}

/// Applies `f` to the String input and one String argument.
fn with_argument(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
    f: impl FnOnce(&str, &str) -> Result<Value, EvaluationError>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(argument) = evaluator.string_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    Ok(EvaluationResult::single(f(&input, &argument)?))
}

/// Implements the FHIRPath indexOf() function
///
/// # Returns
///
/// * The 0-based position of the first occurrence, or -1 if absent
/// * 0 when the substring is empty
fn index_of_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, sub| {
        Ok(Value::Integer(match s.find(sub) {
            Some(offset) => char_position(s, offset)?,
            None => -1,
        }))
    })
}

fn last_index_of_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, sub| {
        Ok(Value::Integer(match s.rfind(sub) {
            Some(offset) => char_position(s, offset)?,
            None => -1,
        }))
    })
}

/// Implements the FHIRPath substring() function
///
/// # Syntax
/// `substring(start: Integer [, length: Integer]) : String`
///
/// Empty when `start` lies outside the string. Without `length` (or with an
/// empty one) the rest of the string is returned.
fn substring_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 2)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(start) = evaluator.integer_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    let length = evaluator.integer_argument(site, 1)?;
    let chars: Vec<char> = input.chars().collect();
    let Ok(start) = usize::try_from(start) else {
        return Ok(EvaluationResult::empty());
    };
    if start >= chars.len() {
        return Ok(EvaluationResult::empty());
    }
    let end = match length {
        Some(length) if length <= 0 => start,
        Some(length) => start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(chars.len()),
        None => chars.len(),
    };
    Ok(EvaluationResult::single(chars[start..end].iter().collect::<String>()))
}

fn starts_with_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, prefix| Ok(Value::Boolean(s.starts_with(prefix))))
}

fn ends_with_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, suffix| Ok(Value::Boolean(s.ends_with(suffix))))
}

fn contains_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, sub| Ok(Value::Boolean(s.contains(sub))))
}

fn upper_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(string_result(string_input(site)?.map(|s| s.to_uppercase())))
}

fn lower_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(string_result(string_input(site)?.map(|s| s.to_lowercase())))
}

/// Implements the FHIRPath replace() function
///
/// Replaces every occurrence of `pattern` with `substitution`. An empty
/// pattern inserts the substitution around every character:
/// `'abc'.replace('', 'x')` is `'xaxbxcx'`.
fn replace_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(2, 2)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let pattern = evaluator.string_argument(site, 0)?;
    let substitution = evaluator.string_argument(site, 1)?;
    let (Some(pattern), Some(substitution)) = (pattern, substitution) else {
        return Ok(EvaluationResult::empty());
    };
    Ok(EvaluationResult::single(input.replace(&pattern, &substitution)))
}

fn regex_match(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
    full: bool,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 2)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(pattern) = evaluator.string_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    let flags = evaluator.string_argument(site, 1)?;
    let pattern = if full { format!("^(?:{})$", pattern) } else { pattern };
    let regex = compile(&pattern, flags.as_deref())?;
    Ok(EvaluationResult::single(regex.is_match(&input)))
}

/// Implements the FHIRPath matches() function: true when the regular
/// expression matches any part of the input.
fn matches_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    regex_match(evaluator, site, false)
}

/// Implements the FHIRPath matchesFull() function: true when the regular
/// expression matches the whole input.
fn matches_full_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    regex_match(evaluator, site, true)
}

/// Implements the FHIRPath replaceMatches() function
///
/// # Syntax
/// `replaceMatches(regex: String, substitution: String [, flags: String]) : String`
///
/// The substitution may refer to capture groups as `$1` or `${name}`. An
/// empty regex returns the input unchanged.
fn replace_matches_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(2, 3)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let pattern = evaluator.string_argument(site, 0)?;
    let substitution = evaluator.string_argument(site, 1)?;
    let (Some(pattern), Some(substitution)) = (pattern, substitution) else {
        return Ok(EvaluationResult::empty());
    };
    if pattern.is_empty() {
        return Ok(EvaluationResult::single(input));
    }
    let flags = evaluator.string_argument(site, 2)?;
    let regex = compile(&pattern, flags.as_deref())?;
    Ok(EvaluationResult::single(
        regex.replace_all(&input, substitution.as_str()).into_owned(),
    ))
}

fn length_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    match string_input(site)? {
        Some(s) => Ok(EvaluationResult::single(char_count(&s)?)),
        None => Ok(EvaluationResult::empty()),
    }
}

fn to_chars_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let chars = string_input(site)?
        .map(|s| s.chars().map(|c| Value::String(c.to_string())).collect())
        .unwrap_or_default();
    Ok(EvaluationResult::ordered(chars))
}

/// Implements the FHIRPath split() function. An empty separator splits
/// into characters.
fn split_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(separator) = evaluator.string_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    let parts: Collection = if separator.is_empty() {
        input.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        input.split(separator.as_str()).map(Value::string).collect()
    };
    Ok(EvaluationResult::ordered(parts))
}

/// Implements the FHIRPath join() function
///
/// Concatenates the String items of the input with the separator (default
/// `''`) between them. Empty input gives empty.
fn join_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 1)?;
    if site.input.is_empty() {
        return Ok(EvaluationResult::empty());
    }
    let separator = evaluator.string_argument(site, 0)?.unwrap_or_default();
    let parts = site
        .input
        .collection
        .iter()
        .map(|item| {
            item.to_string_value(false)?.ok_or_else(|| {
                EvaluationError::TypeError(format!(
                    "join() requires String items, got {}",
                    item.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EvaluationResult::single(parts.join(&separator)))
}

fn trim_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(string_result(string_input(site)?.map(|s| s.trim().to_string())))
}

fn unknown_format(function: &str, format: &str) -> EvaluationError {
    EvaluationError::InvalidArgument(format!("{}(): unknown format '{}'", function, format))
}

/// Implements the FHIRPath encode() function
///
/// Supported formats are `hex`, `base64` and `urlbase64`.
fn encode_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, format| {
        let encoded = match format {
            "hex" => hex::encode(s.as_bytes()),
            "base64" => general_purpose::STANDARD.encode(s.as_bytes()),
            "urlbase64" => general_purpose::URL_SAFE.encode(s.as_bytes()),
            _ => return Err(unknown_format("encode", format)),
        };
        Ok(Value::String(encoded))
    })
}

/// Implements the FHIRPath decode() function
///
/// Input that is not valid in the given format, or does not decode to
/// UTF-8, gives empty.
fn decode_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(format) = evaluator.string_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    let bytes = match format.as_str() {
        "hex" => hex::decode(&input).ok(),
        "base64" => general_purpose::STANDARD.decode(&input).ok(),
        "urlbase64" => general_purpose::URL_SAFE.decode(&input).ok(),
        _ => return Err(unknown_format("decode", &format)),
    };
    Ok(string_result(bytes.and_then(|b| String::from_utf8(b).ok())))
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c if (c as u32) > 127 => escaped.push_str(&format!("&#{};", c as u32)),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Character named by the body of an HTML reference, `amp` or `#233` or `#xE9`.
fn html_reference(body: &str) -> Option<char> {
    match body {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = body.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn unescape_html(s: &str) -> String {
    let mut unescaped = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        unescaped.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];
        let decoded = candidate
            .find(';')
            .and_then(|end| html_reference(&candidate[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                unescaped.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                // Not a reference; keep the ampersand as text.
                unescaped.push('&');
                rest = candidate;
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}

fn escape_json(s: &str) -> Result<String, EvaluationError> {
    let quoted = serde_json::to_string(s).map_err(|e| EvaluationError::Other(e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

fn unescape_json(s: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{}\"", s)).ok()
}

/// Implements the FHIRPath escape() function for the `html` and `json`
/// targets.
fn escape_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    with_argument(evaluator, site, |s, target| match target {
        "html" => Ok(Value::String(escape_html(s))),
        "json" => Ok(Value::String(escape_json(s)?)),
        _ => Err(unknown_format("escape", target)),
    })
}

fn unescape_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(input) = string_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let Some(target) = evaluator.string_argument(site, 0)? else {
        return Ok(EvaluationResult::empty());
    };
    match target.as_str() {
        "html" => Ok(EvaluationResult::single(unescape_html(&input))),
        "json" => Ok(string_result(unescape_json(&input))),
        _ => Err(unknown_format("unescape", &target)),
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("indexOf", index_of_function);
    registry.register("lastIndexOf", last_index_of_function);
    registry.register("substring", substring_function);
    registry.register("startsWith", starts_with_function);
    registry.register("endsWith", ends_with_function);
    registry.register("contains", contains_function);
    registry.register("upper", upper_function);
    registry.register("lower", lower_function);
    registry.register("replace", replace_function);
    registry.register("matches", matches_function);
    registry.register("matchesFull", matches_full_function);
    registry.register("replaceMatches", replace_matches_function);
    registry.register("length", length_function);
    registry.register("toChars", to_chars_function);
    registry.register("split", split_function);
    registry.register("join", join_function);
    registry.register("trim", trim_function);
    registry.register("encode", encode_function);
    registry.register("decode", decode_function);
    registry.register("escape", escape_function);
    registry.register("unescape", unescape_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn value(source: &str) -> Value {
        eval(source).unwrap().collection[0].clone()
    }

    #[test]
    fn test_searching() {
        assert_eq!(value("'abcabc'.indexOf('bc')"), Value::Integer(1));
        assert_eq!(value("'abcabc'.lastIndexOf('bc')"), Value::Integer(4));
        assert_eq!(value("'abc'.indexOf('x')"), Value::Integer(-1));
        assert_eq!(value("'abc'.indexOf('')"), Value::Integer(0));
        assert_eq!(value("'héllo'.indexOf('l')"), Value::Integer(2));
        assert_eq!(value("'abc'.startsWith('ab')"), Value::Boolean(true));
        assert_eq!(value("'abc'.endsWith('')"), Value::Boolean(true));
        assert_eq!(value("'abc'.contains('d')"), Value::Boolean(false));
        assert!(eval("{}.contains('a')").unwrap().is_empty());
    }

    #[test]
    fn test_substring() {
        assert_eq!(value("'abcdef'.substring(3)"), Value::string("def"));
        assert_eq!(value("'abcdef'.substring(1, 2)"), Value::string("bc"));
        assert_eq!(value("'abcdef'.substring(4, 10)"), Value::string("ef"));
        assert!(eval("'abc'.substring(5)").unwrap().is_empty());
        assert!(eval("'abc'.substring(-1)").unwrap().is_empty());
    }

    #[test]
    fn test_replace_with_empty_pattern() {
        assert_eq!(value("'abc'.replace('', 'x')"), Value::string("xaxbxcx"));
        assert_eq!(value("'abcb'.replace('b', 'B')"), Value::string("aBcB"));
        assert!(eval("'abc'.replace({}, 'x')").unwrap().is_empty());
    }

    #[test]
    fn test_regular_expressions() {
        assert_eq!(value("'abc123'.matches('[0-9]+')"), Value::Boolean(true));
        assert_eq!(value("'abc123'.matchesFull('[0-9]+')"), Value::Boolean(false));
        assert_eq!(value("'ABC'.matches('abc', 'i')"), Value::Boolean(true));
        assert_eq!(value("'a\\nb'.matches('a.b')"), Value::Boolean(true));
        assert_eq!(
            value("'John Smith'.replaceMatches('(\\\\w+) (\\\\w+)', '$2, $1')"),
            Value::string("Smith, John")
        );
        assert!(matches!(eval("'a'.matches('(')"), Err(EvaluationError::InvalidRegex(_))));
    }

    #[test]
    fn test_split_join_and_chars() {
        let parts = eval("'a,b,,c'.split(',')").unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(value("'a,b,c'.split(',').join('-')"), Value::string("a-b-c"));
        assert_eq!(value("('x' | 'y').join()"), Value::string("xy"));
        assert_eq!(eval("'abc'.toChars()").unwrap().len(), 3);
        assert_eq!(value("'héllo'.length()"), Value::Integer(5));
        assert_eq!(value("'  padded '.trim()"), Value::string("padded"));
    }

    #[test]
    fn test_case_mapping() {
        assert_eq!(value("'Abc'.upper()"), Value::string("ABC"));
        assert_eq!(value("'Abc'.lower()"), Value::string("abc"));
        assert!(matches!(eval("1.upper()"), Err(EvaluationError::TypeError(_))));
    }

    #[test]
    fn test_encode_decode() {
        assert_eq!(value("'test'.encode('hex')"), Value::string("74657374"));
        assert_eq!(value("'test'.encode('base64')"), Value::string("dGVzdA=="));
        assert_eq!(value("'dGVzdA=='.decode('base64')"), Value::string("test"));
        assert_eq!(value("'74657374'.decode('hex')"), Value::string("test"));
        assert!(eval("'zz'.decode('hex')").unwrap().is_empty());
        assert!(matches!(eval("'a'.encode('rot13')"), Err(EvaluationError::InvalidArgument(_))));
    }

    #[test]
    fn test_escape_unescape() {
        assert_eq!(value("'<a & b>'.escape('html')"), Value::string("&lt;a &amp; b&gt;"));
        assert_eq!(value("'&lt;a&gt;'.unescape('html')"), Value::string("<a>"));
        assert_eq!(value("'say \"hi\"'.escape('json')"), Value::string("say \\\"hi\\\""));
        assert_eq!(value("'say \\\\\"hi\\\\\"'.unescape('json')"), Value::string("say \"hi\""));
    }

    #[test]
    fn test_escape_html_non_ascii() {
        assert_eq!(value("'<a>é'.escape('html')"), Value::string("&lt;a&gt;&#233;"));
        assert_eq!(value("'&lt;a&gt;&#233;'.unescape('html')"), Value::string("<a>é"));
        assert_eq!(value("'&#xE9;&#x20AC;'.unescape('html')"), Value::string("é€"));
        assert_eq!(value("'<a>é'.escape('html').unescape('html')"), Value::string("<a>é"));
        assert_eq!(value("'&amp;lt; & ;'.unescape('html')"), Value::string("&lt; & ;"));
    }

    #[test]
    fn test_escape_json_keeps_markup() {
        assert_eq!(value("'<a> & é'.escape('json')"), Value::string("<a> & é"));
    }
}
