use std::collections::BTreeMap;

use anyhow::{bail, Result};
use infergate_core::{Engine, MemberKind, Predictor, TensorBatch};

use crate::engines::{EchoEngine, MeanEngine};

/// One of the engines compiled into the daemon.
pub enum BuiltinEngine {
    Echo(Predictor<EchoEngine>),
    Mean(Predictor<MeanEngine>),
}

impl Engine for BuiltinEngine {
    type Output = TensorBatch;

    fn name(&self) -> &str {
        match self {
            BuiltinEngine::Echo(engine) => engine.name(),
            BuiltinEngine::Mean(engine) => engine.name(),
        }
    }

    fn describe(&self, member: &str) -> Option<MemberKind> {
        match self {
            BuiltinEngine::Echo(engine) => engine.describe(member),
            BuiltinEngine::Mean(engine) => engine.describe(member),
        }
    }

    fn invoke(&self, operation: &str, batch: TensorBatch) -> Result<TensorBatch> {
        match self {
            BuiltinEngine::Echo(engine) => engine.invoke(operation, batch),
            BuiltinEngine::Mean(engine) => engine.invoke(operation, batch),
        }
    }
}

type Loader = fn() -> BuiltinEngine;

pub struct EngineRegistry {
    engines: BTreeMap<&'static str, Loader>,
}

impl EngineRegistry {
    pub fn builtin() -> Self {
        let mut engines: BTreeMap<&'static str, Loader> = BTreeMap::new();
        engines.insert("echo", || BuiltinEngine::Echo(Predictor::new("echo", EchoEngine)));
        engines.insert("mean", || BuiltinEngine::Mean(Predictor::new("mean", MeanEngine)));
        Self { engines }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.engines.keys().copied()
    }

    pub fn load(&self, name: &str) -> Result<BuiltinEngine> {
        match self.engines.get(name) {
            Some(load) => Ok(load()),
            None => {
                let available: Vec<_> = self.names().collect();
                bail!(
                    "unknown engine: {name} (expected one of {})",
                    available.join(", ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infergate_core::{check_contract, DEFAULT_PREDICT_OP};

    #[test]
    fn builtin_engines_satisfy_the_default_contract() -> Result<()> {
        let registry = EngineRegistry::builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["echo", "mean"]);
        for name in ["echo", "mean"] {
            let engine = registry.load(name)?;
            assert_eq!(engine.name(), name);
            check_contract(&engine, DEFAULT_PREDICT_OP)?;
        }
        Ok(())
    }

    #[test]
    fn unknown_engine_lists_alternatives() {
        let err = EngineRegistry::builtin().load("torch").err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("unknown engine: torch (expected one of echo, mean)")
        );
    }
}
