use super::types::{Condition, ExpressionNode, Param};
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// A query expression compiled into a matching predicate.
///
/// Compilation binds `${param}` references, pre-lowercases match terms and
/// enforces the boolean clause budget so that per-document evaluation does no
/// allocation and no name lookups beyond a field-map probe.
#[derive(Debug)]
pub struct CompiledQuery {
    root: CompiledNode,
    clause_count: usize,
}

#[derive(Debug)]
enum CompiledNode {
    And(Vec<CompiledNode>),
    Or(Vec<CompiledNode>),
    Not(Box<CompiledNode>),
    Term {
        field: String,
        condition: Condition,
        value: String,
        value_lower: String,
        numeric: Option<f64>,
    },
}

impl CompiledQuery {
    /// Compiles `expression` with `params` bound, failing if the number of
    /// leaf clauses exceeds `max_clause_count`.
    pub fn compile(
        expression: &ExpressionNode,
        params: &[Param],
        max_clause_count: usize,
    ) -> Result<Self> {
        let param_map: HashMap<&str, &str> = params
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect();

        let mut clause_count = 0usize;
        let root = compile_node(expression, &param_map, &mut clause_count)?;

        if clause_count > max_clause_count {
            return Err(anyhow!(
                "Query contains {} clauses, exceeding the maximum of {}",
                clause_count,
                max_clause_count
            ));
        }
        if clause_count == 0 {
            return Err(anyhow!("Search expression has no terms"));
        }

        Ok(Self { root, clause_count })
    }

    pub fn clause_count(&self) -> usize {
        self.clause_count
    }

    /// Evaluates the predicate against one document's stored field values.
    pub fn matches(&self, fields: &HashMap<String, String>) -> bool {
        eval(&self.root, fields)
    }
}

fn compile_node(
    node: &ExpressionNode,
    params: &HashMap<&str, &str>,
    clause_count: &mut usize,
) -> Result<CompiledNode> {
    match node {
        ExpressionNode::And(children) => Ok(CompiledNode::And(compile_children(
            children,
            params,
            clause_count,
        )?)),
        ExpressionNode::Or(children) => Ok(CompiledNode::Or(compile_children(
            children,
            params,
            clause_count,
        )?)),
        ExpressionNode::Not(child) => Ok(CompiledNode::Not(Box::new(compile_node(
            child,
            params,
            clause_count,
        )?))),
        ExpressionNode::Term {
            field,
            condition,
            value,
        } => {
            *clause_count += 1;
            let value = bind_params(value, params)?;
            let value_lower = value.to_lowercase();
            let numeric = value.parse::<f64>().ok();
            Ok(CompiledNode::Term {
                field: field.clone(),
                condition: *condition,
                value,
                value_lower,
                numeric,
            })
        }
    }
}

fn compile_children(
    children: &[ExpressionNode],
    params: &HashMap<&str, &str>,
    clause_count: &mut usize,
) -> Result<Vec<CompiledNode>> {
    children
        .iter()
        .map(|child| compile_node(child, params, clause_count))
        .collect()
}

/// Replaces `${key}` references with bound parameter values. An unbound
/// reference is a setup error: the expression cannot be evaluated.
fn bind_params(value: &str, params: &HashMap<&str, &str>) -> Result<String> {
    if !value.contains("${") {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow!("Unterminated parameter reference in '{}'", value))?;
        let key = &after[..end];
        let bound = params
            .get(key)
            .ok_or_else(|| anyhow!("No value bound for parameter '{}'", key))?;
        out.push_str(bound);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn eval(node: &CompiledNode, fields: &HashMap<String, String>) -> bool {
    match node {
        CompiledNode::And(children) => children.iter().all(|child| eval(child, fields)),
        CompiledNode::Or(children) => children.iter().any(|child| eval(child, fields)),
        CompiledNode::Not(child) => !eval(child, fields),
        CompiledNode::Term {
            field,
            condition,
            value,
            value_lower,
            numeric,
        } => {
            let Some(actual) = fields.get(field) else {
                return false;
            };
            match condition {
                Condition::Equals => actual == value,
                Condition::Contains => actual.to_lowercase().contains(value_lower.as_str()),
                Condition::GreaterThan => compare(actual, value, *numeric)
                    .map(|ord| ord == std::cmp::Ordering::Greater)
                    .unwrap_or(false),
                Condition::GreaterThanOrEqualTo => compare(actual, value, *numeric)
                    .map(|ord| ord != std::cmp::Ordering::Less)
                    .unwrap_or(false),
                Condition::LessThan => compare(actual, value, *numeric)
                    .map(|ord| ord == std::cmp::Ordering::Less)
                    .unwrap_or(false),
                Condition::LessThanOrEqualTo => compare(actual, value, *numeric)
                    .map(|ord| ord != std::cmp::Ordering::Greater)
                    .unwrap_or(false),
            }
        }
    }
}

/// Numeric comparison when both sides parse as numbers, lexicographic
/// otherwise.
fn compare(actual: &str, expected: &str, expected_numeric: Option<f64>) -> Option<std::cmp::Ordering> {
    if let Some(expected_num) = expected_numeric {
        if let Ok(actual_num) = actual.parse::<f64>() {
            return actual_num.partial_cmp(&expected_num);
        }
    }
    Some(actual.cmp(expected))
}
