use std::collections::HashMap;

use thiserror::Error;

/// Bracketed groups seen so far in a trace, mapping the group text to its member tokens.
///
/// Both `prim::ListConstruct` outputs (`_3 -> [input0, input1]`) and nested argument groups
/// (`annotate(List[_3, _4], int) -> [_3, _4, int]`) end up here.
pub type NamedGroups = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TokenizeError {
    #[error("unbalanced '{symbol}' at position {position} in '{input}'")]
    Unbalanced {
        input: String,
        symbol: char,
        position: usize,
    },
    #[error("'{symbol}' is never closed in '{input}'")]
    Unclosed { input: String, symbol: char },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Group {
    Paren,
    Bracket,
    /// A bare `[..]` list opening a fresh token, its elements are flattened into the token stream.
    List,
}

/// Split an instruction argument list into its tokens.
///
/// Parentheses and brackets inside a token group their contents, so `annotate(List[_3, _4], int)` stays a
/// single token. A bare list `[1, 1]` that starts a new token is flattened into its elements.
/// Every call-like token is registered in `named_groups` together with its members.
///
/// On error nothing is registered.
pub fn split_inputs(inputs: &str, named_groups: &mut NamedGroups) -> Result<Vec<String>, TokenizeError> {
    let tokens = split_raw(inputs)?;

    let mut registered = NamedGroups::new();
    for token in &tokens {
        register_group(token, named_groups, &mut registered)?;
    }
    named_groups.extend(registered);

    Ok(tokens)
}

fn split_raw(inputs: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = vec![];
    let mut stack: Vec<Group> = vec![];
    let mut curr = String::new();

    for (position, c) in inputs.char_indices() {
        let grouped = stack.iter().any(|&g| g != Group::List);

        match c {
            '(' => {
                stack.push(Group::Paren);
                curr.push(c);
            }
            '[' => {
                if !grouped && curr.trim().is_empty() {
                    stack.push(Group::List);
                } else {
                    stack.push(Group::Bracket);
                    curr.push(c);
                }
            }
            ')' | ']' => match (stack.pop(), c) {
                (Some(Group::Paren), ')') | (Some(Group::Bracket), ']') => curr.push(c),
                (Some(Group::List), ']') => flush(&mut curr, &mut tokens),
                _ => {
                    return Err(TokenizeError::Unbalanced {
                        input: inputs.to_owned(),
                        symbol: c,
                        position,
                    })
                }
            },
            ',' if !grouped => flush(&mut curr, &mut tokens),
            _ => curr.push(c),
        }
    }

    if let Some(&open) = stack.last() {
        let symbol = match open {
            Group::Paren => '(',
            Group::Bracket | Group::List => '[',
        };
        return Err(TokenizeError::Unclosed {
            input: inputs.to_owned(),
            symbol,
        });
    }

    flush(&mut curr, &mut tokens);
    Ok(tokens)
}

fn flush(curr: &mut String, tokens: &mut Vec<String>) {
    let token = curr.trim();
    if !token.is_empty() {
        tokens.push(token.to_owned());
    }
    curr.clear();
}

/// Split `token` into `(head, inner)` if it has the form `head(inner)` or `head[inner]`
/// with `head` a plain identifier and the first opener closed by the last character.
pub(crate) fn split_call(token: &str, open: char, close: char) -> Option<(&str, &str)> {
    let start = token.find(open)?;

    let mut depth = 0usize;
    let mut end = None;
    for (position, c) in token[start..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                end = Some(start + position);
                break;
            }
        }
    }
    if end? + close.len_utf8() != token.len() {
        return None;
    }

    let head = &token[..start];
    let is_identifier = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':' || c == '.');
    is_identifier.then(|| (head, &token[start + 1..token.len() - 1]))
}

/// Register `token` and its nested groups into `registered`, skipping groups already in `known`.
fn register_group(token: &str, known: &NamedGroups, registered: &mut NamedGroups) -> Result<(), TokenizeError> {
    let inner = match split_call(token, '(', ')') {
        Some((_, inner)) => inner,
        None => return Ok(()),
    };
    if known.contains_key(token) || registered.contains_key(token) {
        return Ok(());
    }

    let mut members = vec![];
    for member in split_raw(inner)? {
        register_group(&member, known, registered)?;

        match split_call(&member, '[', ']') {
            // typed lists like `List[_3, _4]` contribute their elements
            Some((_, elements)) => members.extend(split_raw(elements)?),
            None => members.push(member),
        }
    }

    registered.insert(token.to_owned(), members);
    Ok(())
}
