//! Chain grammar: the fixed ordering constraints a chain must satisfy.
//!
//! A chain is reduced to the token sequence of its members and matched
//! against one pattern per axis:
//!
//! - key axis: optional `Prefix`, then any number of `Encoding` stages,
//!   then an optional terminal `Digest` or `Truncate`.
//! - value axis: any number of `Serial`/`Compress` stages, then an
//!   optional terminal `Mac`.
//!
//! Validation runs once, at configuration time, never on the hot path.

use std::sync::Arc;

use crate::transform::{Axis, ConfigError, Token, TransformSpec};

fn chain_display(specs: &[Arc<TransformSpec>]) -> String {
    specs
        .iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn grammar_error(axis: Axis, specs: &[Arc<TransformSpec>], reason: String) -> ConfigError {
    ConfigError::InvalidChainGrammar {
        axis,
        chain: chain_display(specs),
        reason,
    }
}

/// Validate applicability and token ordering for one axis.
pub(crate) fn validate_chain(axis: Axis, specs: &[Arc<TransformSpec>]) -> Result<(), ConfigError> {
    for spec in specs {
        if !spec.applies_to.covers(axis) {
            return Err(grammar_error(
                axis,
                specs,
                format!("`{}` is not a {axis} transform", spec.name),
            ));
        }
        if !spec.encodes_on(axis) {
            return Err(grammar_error(
                axis,
                specs,
                format!("`{}` has no {axis} encoder", spec.name),
            ));
        }
    }

    let tokens: Vec<Token> = specs.iter().map(|s| s.token).collect();
    let mut cursor = 0;
    match axis {
        Axis::Key => {
            if tokens.get(cursor) == Some(&Token::Prefix) {
                cursor += 1;
            }
            while tokens.get(cursor) == Some(&Token::Encoding) {
                cursor += 1;
            }
            if matches!(tokens.get(cursor), Some(Token::Digest | Token::Truncate)) {
                cursor += 1;
            }
        }
        Axis::Value => {
            while matches!(tokens.get(cursor), Some(Token::Serial | Token::Compress)) {
                cursor += 1;
            }
            if tokens.get(cursor) == Some(&Token::Mac) {
                cursor += 1;
            }
        }
    }

    if cursor != tokens.len() {
        return Err(grammar_error(
            axis,
            specs,
            format!("`{}` is out of order", specs[cursor].name),
        ));
    }
    Ok(())
}
