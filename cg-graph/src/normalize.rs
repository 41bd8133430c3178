use std::collections::HashSet;

use tracing::{debug, trace};

use crate::result::{GraphError, GraphResult};
use crate::tokenize::{split_call, split_inputs, NamedGroups};

/// A declared model input.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TensorDecl {
    pub line: usize,
    pub name: String,
    pub shape: Vec<usize>,
}

/// A declared module parameter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParamDecl {
    pub line: usize,
    pub name: String,
    pub shape: Vec<usize>,
    pub scope: Option<String>,
}

/// An instruction argument that refers to a tensor.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InputRef {
    /// The output of an earlier instruction or a model input.
    Value(String),
    /// A module parameter.
    Parameter(String),
}

/// A single op instruction, with its arguments resolved.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TraceRecord {
    /// 1-based line number in the trace text.
    pub line: usize,
    pub op_type: String,
    pub callee: String,
    pub output: String,
    pub output_shape: Vec<usize>,
    pub inputs: Vec<InputRef>,
    /// Literal arguments, in order.
    pub constants: Vec<String>,
    pub scope: Option<String>,
}

/// A trace reduced to declarations and op records, in trace order.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTrace {
    pub inputs: Vec<TensorDecl>,
    pub params: Vec<ParamDecl>,
    pub records: Vec<TraceRecord>,
    pub outputs: Vec<String>,
    /// Line of the `return` instruction, 0 if the trace has none.
    pub return_line: usize,
    pub named_groups: NamedGroups,
}

#[derive(Debug, Default)]
struct Normalizer {
    values: HashSet<String>,
    params: HashSet<String>,
    result: NormalizedTrace,
}

/// Interpret the raw trace text, see [RawTrace](cg_trace::tracer::RawTrace) for the line grammar.
pub fn normalize_trace(text: &str) -> GraphResult<NormalizedTrace> {
    let mut state = Normalizer::default();
    let mut seen_header = false;

    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw_line.trim();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        if !seen_header {
            state.visit_header(line, content)?;
            seen_header = true;
        } else if let Some(rest) = content.strip_prefix("return ") {
            state.visit_return(line, rest)?;
        } else {
            state.visit_instruction(line, content)?;
        }
    }

    if !seen_header {
        return Err(syntax(1, "trace is empty, expected a graph(..): header"));
    }

    let result = state.result;
    debug!(
        "Normalized trace: {} inputs, {} parameters, {} op records, {} outputs",
        result.inputs.len(),
        result.params.len(),
        result.records.len(),
        result.outputs.len()
    );
    Ok(result)
}

impl Normalizer {
    fn visit_header(&mut self, line: usize, content: &str) -> GraphResult<()> {
        let inner = content
            .strip_suffix(':')
            .and_then(|s| split_call(s, '(', ')'))
            .filter(|&(head, _)| head == "graph")
            .map(|(_, inner)| inner)
            .ok_or_else(|| syntax(line, "expected a graph(..): header"))?;

        for decl in self.tokenize(line, inner)? {
            let (name, shape) = parse_decl(line, &decl)?;
            self.define(line, &name)?;
            self.values.insert(name.clone());
            self.result.inputs.push(TensorDecl { line, name, shape });
        }

        Ok(())
    }

    fn visit_return(&mut self, line: usize, rest: &str) -> GraphResult<()> {
        let inner = rest
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| syntax(line, "expected return (..)"))?;

        self.result.return_line = line;
        for name in self.tokenize(line, inner)? {
            if !self.values.contains(&name) {
                return Err(GraphError::UnresolvedReference { line, name });
            }
            self.result.outputs.push(name);
        }

        Ok(())
    }

    fn visit_instruction(&mut self, line: usize, content: &str) -> GraphResult<()> {
        let (lhs, rhs) = content
            .split_once(" = ")
            .ok_or_else(|| syntax(line, "expected '<output> = <instruction>'"))?;
        let (name, shape) = parse_decl(line, lhs)?;

        let (call, scope) = match rhs.rsplit_once(", scope: ") {
            Some((call, scope)) => (call, Some(scope.trim().to_owned())),
            None => (rhs, None),
        };
        let (callee, args) =
            split_instruction(call.trim()).ok_or_else(|| syntax(line, "expected a call '<namespace>::<op>(..)'"))?;

        match callee {
            "prim::Param" => {
                self.define(line, &name)?;
                self.params.insert(name.clone());
                self.result.params.push(ParamDecl {
                    line,
                    name,
                    shape,
                    scope,
                });
            }
            "prim::ListConstruct" | "prim::TupleConstruct" => {
                let members = self.tokenize(line, args)?;

                // resolve eagerly so forward references fail at the construct itself
                let mut inputs = vec![];
                let mut constants = vec![];
                for member in &members {
                    self.resolve(line, member, &mut inputs, &mut constants)?;
                }

                self.define(line, &name)?;
                trace!("line {}: group {} = {:?}", line, name, members);
                self.result.named_groups.insert(name, members);
            }
            _ => {
                let op_type = callee.rsplit("::").next().unwrap_or(callee).trim_matches('_');
                if op_type.is_empty() {
                    return Err(syntax(line, format!("invalid op name '{}'", callee)));
                }

                let mut inputs = vec![];
                let mut constants = vec![];
                for token in self.tokenize(line, args)? {
                    self.resolve(line, &token, &mut inputs, &mut constants)?;
                }

                self.define(line, &name)?;
                self.values.insert(name.clone());
                trace!("line {}: {} = {}({:?})", line, name, op_type, inputs);

                self.result.records.push(TraceRecord {
                    line,
                    op_type: op_type.to_owned(),
                    callee: callee.to_owned(),
                    output: name,
                    output_shape: shape,
                    inputs,
                    constants,
                    scope,
                });
            }
        }

        Ok(())
    }

    fn tokenize(&mut self, line: usize, args: &str) -> GraphResult<Vec<String>> {
        split_inputs(args, &mut self.result.named_groups).map_err(|source| GraphError::Tokenize { line, source })
    }

    fn define(&self, line: usize, name: &str) -> GraphResult<()> {
        let taken =
            self.values.contains(name) || self.params.contains(name) || self.result.named_groups.contains_key(name);
        if taken {
            return Err(GraphError::DuplicateName {
                line,
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn resolve(
        &self,
        line: usize,
        token: &str,
        inputs: &mut Vec<InputRef>,
        constants: &mut Vec<String>,
    ) -> GraphResult<()> {
        if self.values.contains(token) {
            inputs.push(InputRef::Value(token.to_owned()));
        } else if self.params.contains(token) {
            inputs.push(InputRef::Parameter(token.to_owned()));
        } else if let Some(members) = self.result.named_groups.get(token) {
            for member in members {
                self.resolve(line, member, inputs, constants)?;
            }
        } else if is_literal(token) {
            constants.push(token.to_owned());
        } else {
            return Err(GraphError::UnresolvedReference {
                line,
                name: token.to_owned(),
            });
        }

        Ok(())
    }
}

/// Parse `name : Type` into the name and the shape described by the type.
/// Only `Float(..)` types carry dimensions, every other type is treated as a scalar.
fn parse_decl(line: usize, decl: &str) -> GraphResult<(String, Vec<usize>)> {
    let (name, ty) = match decl.split_once(" : ") {
        Some((name, ty)) => (name.trim(), Some(ty.trim())),
        None => (decl.trim(), None),
    };

    let is_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !is_name {
        return Err(syntax(line, format!("invalid name '{}'", name)));
    }

    let shape = match ty.and_then(|ty| split_call(ty, '(', ')')) {
        Some((_, dims)) => dims
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|_| syntax(line, format!("invalid dimension '{}' in '{}'", d, decl)))
            })
            .collect::<GraphResult<Vec<_>>>()?,
        None => vec![],
    };

    Ok((name.to_owned(), shape))
}

/// Split `ns::op(args)` at the first `(` and the final `)`.
/// The arguments are left for the tokenizer, which reports any imbalance inside them.
fn split_instruction(call: &str) -> Option<(&str, &str)> {
    let (callee, args) = call.strip_suffix(')')?.split_once('(')?;
    let is_callee = !callee.is_empty()
        && callee
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':' || c == '.');
    is_callee.then_some((callee, args))
}

fn is_literal(token: &str) -> bool {
    const WORDS: &[&str] = &["True", "False", "None", "int", "float", "bool", "str", "Tensor", "Device"];

    WORDS.contains(&token)
        || token.parse::<i64>().is_ok()
        || token.parse::<f64>().is_ok()
        || token.starts_with('"')
        || token.starts_with('\'')
}

fn syntax(line: usize, message: impl Into<String>) -> GraphError {
    GraphError::Syntax {
        line,
        message: message.into(),
    }
}
