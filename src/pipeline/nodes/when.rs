//! WhenRouter: conditional branching.
//!
//! Branch `i` of the `expressions` option is bound to output port `i`.
//! Expressions are tried in order and the packet goes to the first branch
//! that matches. Packets matching no branch are dropped; filter-side
//! routers always end with a catch-all so this only happens on the output
//! side.

use crate::pipeline::agent::EXPRESSIONS_OPTION;
use crate::pipeline::error::ProcessorError;
use crate::pipeline::options::{Options, Value};
use crate::pipeline::packet::Packet;
use crate::pipeline::port::PortNumber;
use crate::pipeline::processor::{Emitter, Processor, ProcessorContext};
use crate::scripting::{Condition, ExpressionEngine};

pub struct WhenRouter {
    engine: ExpressionEngine,
    conditions: Vec<Condition>,
    emitter: Option<Emitter>,
    label: String,
}

impl WhenRouter {
    pub fn new() -> Self {
        Self {
            engine: ExpressionEngine::new(),
            conditions: Vec::new(),
            emitter: None,
            label: String::new(),
        }
    }

    /// Port of the first matching branch.
    pub fn select(&self, packet: &Packet) -> Option<PortNumber> {
        self.conditions
            .iter()
            .position(|c| self.engine.matches(c, packet))
            .and_then(|i| PortNumber::try_from(i).ok())
    }
}

impl Default for WhenRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for WhenRouter {
    fn configure(&mut self, ctx: ProcessorContext, options: &Options) -> Result<(), ProcessorError> {
        let expressions = options
            .get(EXPRESSIONS_OPTION)
            .and_then(Value::as_list)
            .ok_or_else(|| ProcessorError::Options(format!("'{EXPRESSIONS_OPTION}' list is required")))?;

        self.conditions = expressions
            .iter()
            .map(|e| {
                let source = e.as_str().ok_or_else(|| {
                    ProcessorError::Options("branch expressions must be strings".into())
                })?;
                self.engine.compile(source)
            })
            .collect::<Result<_, _>>()?;

        self.label = ctx.label.clone();
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        let emitter = self
            .emitter
            .as_ref()
            .ok_or_else(|| ProcessorError::msg("router used before configure"))?;

        match self.select(&packet) {
            Some(port) => {
                emitter.send(packet, port);
            }
            None => tracing::debug!("{}: no branch matched, packet dropped", self.label),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::AgentId;
    use crate::pipeline::processor::Outlet;
    use crate::pipeline::stats::AgentStats;
    use crossbeam_channel::{unbounded, Receiver};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn router(expressions: Vec<&str>) -> (WhenRouter, Vec<Receiver<Packet>>) {
        let mut routes = BTreeMap::new();
        let mut receivers = Vec::new();
        for port in 0..expressions.len() {
            let (tx, rx) = unbounded();
            routes.insert(port as PortNumber, vec![Outlet { target: AgentId(9), tx }]);
            receivers.push(rx);
        }

        let mut ctx = ProcessorContext::detached(AgentId(1), "when");
        ctx.emitter = Emitter::new(AgentId(1), routes, Arc::new(AgentStats::new()));

        let mut options = Options::new();
        options.insert(EXPRESSIONS_OPTION, expressions);

        let mut router = WhenRouter::new();
        router.configure(ctx, &options).unwrap();
        (router, receivers)
    }

    fn packet(json: &str) -> Packet {
        Packet::from_json(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let (router, rx) = router(vec!["a == 1", "a >= 1", "true"]);
        router.receive(packet(r#"{"a": 1}"#)).unwrap();
        router.receive(packet(r#"{"a": 5}"#)).unwrap();
        router.receive(packet(r#"{"a": 0}"#)).unwrap();
        router.receive(packet(r#"{"b": 0}"#)).unwrap();

        assert_eq!(rx[0].len(), 1);
        assert_eq!(rx[1].len(), 1);
        assert_eq!(rx[2].len(), 2);
    }

    #[test]
    fn test_unmatched_is_dropped() {
        let (router, rx) = router(vec!["a == 1"]);
        router.receive(packet(r#"{"a": 2}"#)).unwrap();
        assert!(rx[0].is_empty());
        assert_eq!(router.select(&packet(r#"{"a": 1}"#)), Some(0));
    }

    #[test]
    fn test_configure_requires_expressions() {
        let mut router = WhenRouter::new();
        let err = router
            .configure(ProcessorContext::detached(AgentId(1), "when"), &Options::new())
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Options(_)));
    }

    #[test]
    fn test_configure_rejects_bad_expression() {
        let mut router = WhenRouter::new();
        let mut options = Options::new();
        options.insert(EXPRESSIONS_OPTION, vec!["a == ("]);
        assert!(matches!(
            router.configure(ProcessorContext::detached(AgentId(1), "when"), &options),
            Err(ProcessorError::Expression(_))
        ));
    }
}
