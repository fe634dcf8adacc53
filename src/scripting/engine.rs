//! Rhai expression engine for branch conditions.
//!
//! ## Variables
//!
//! - every top-level packet field whose name is a valid identifier
//! - `event` - the whole packet as a map (`event["@timestamp"]`, `event.a.b`)
//!
//! ## Functions
//!
//! - `field(event, "a.b")` - dotted-path lookup, `()` when missing
//! - `has(event, "a.b")` - whether a dotted path exists

use crate::pipeline::error::ProcessorError;
use crate::pipeline::packet::Packet;
use rhai::{Dynamic, Engine, Map, Scope, AST};

/// Expression that always matches; used for else branches.
pub const CATCH_ALL: &str = "true";

/// A compiled branch condition.
#[derive(Debug, Clone)]
pub enum Condition {
    /// The literal catch-all; never evaluated.
    Always,
    Script { source: String, ast: AST },
}

impl Condition {
    pub fn source(&self) -> &str {
        match self {
            Condition::Always => CATCH_ALL,
            Condition::Script { source, .. } => source,
        }
    }
}

/// Compiles and evaluates branch conditions against packets.
///
/// Evaluation state lives in a per-call `Scope`, so one engine can be shared
/// by every worker of an agent.
pub struct ExpressionEngine {
    engine: Engine,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine }
    }

    fn configure_engine(engine: &mut Engine) {
        // Safety limits
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("field", |event: Map, path: &str| -> Dynamic {
            lookup(&event, path).unwrap_or(Dynamic::UNIT)
        });
        engine.register_fn("has", |event: Map, path: &str| -> bool {
            lookup(&event, path).is_some()
        });
    }

    /// Compile an expression. The literal `true` short-circuits to
    /// [`Condition::Always`].
    pub fn compile(&self, expression: &str) -> Result<Condition, ProcessorError> {
        let trimmed = expression.trim();
        if trimmed == CATCH_ALL {
            return Ok(Condition::Always);
        }
        let ast = self
            .engine
            .compile_expression(trimmed)
            .map_err(|e| ProcessorError::Expression(format!("'{trimmed}': {e}")))?;
        Ok(Condition::Script {
            source: trimmed.to_string(),
            ast,
        })
    }

    pub fn evaluate(&self, condition: &Condition, packet: &Packet) -> Result<bool, ProcessorError> {
        let (source, ast) = match condition {
            Condition::Always => return Ok(true),
            Condition::Script { source, ast } => (source, ast),
        };

        let mut scope = Scope::new();
        for (name, value) in packet.fields() {
            if is_identifier(name) {
                scope.push_dynamic(name.clone(), to_dynamic(value)?);
            }
        }
        scope.push_dynamic("event", to_dynamic(packet.fields())?);

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, ast)
            .map_err(|e| ProcessorError::Expression(format!("'{source}': {e}")))?;

        result.as_bool().map_err(|type_name| {
            ProcessorError::Expression(format!("'{source}' returned {type_name}, expected bool"))
        })
    }

    /// Evaluate, treating evaluation errors as a non-match.
    pub fn matches(&self, condition: &Condition, packet: &Packet) -> bool {
        match self.evaluate(condition, packet) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!("Condition treated as false: {}", e);
                false
            }
        }
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_dynamic<T: serde::Serialize>(value: T) -> Result<Dynamic, ProcessorError> {
    rhai::serde::to_dynamic(value).map_err(|e| ProcessorError::Expression(e.to_string()))
}

fn lookup(event: &Map, path: &str) -> Option<Dynamic> {
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let mut current = event.get(segments.next()?)?.clone();
    for segment in segments {
        let next = if let Some(map) = current.read_lock::<Map>() {
            map.get(segment).cloned()
        } else {
            None
        };
        current = next?;
    }
    Some(current)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
