//! The embedded Rhai engine and the scope every run starts from

use super::api::{self, ScriptDevices, ScriptState, SharedRegistry};
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, ParseError, Scope, AST};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info};

/// One configured engine shared by the active script and all modules
pub struct ScriptHost {
    engine: Engine,
    scope: Scope<'static>,
    registry: SharedRegistry,
    state: ScriptState,
    tick: Rc<Cell<u64>>,
}

impl ScriptHost {
    pub fn new(registry: SharedRegistry) -> Self {
        let tick = Rc::new(Cell::new(0));
        let mut engine = Engine::new();
        api::register(&mut engine, tick.clone());
        engine.on_print(|text| info!("{}", text));
        engine.on_debug(|text, source, pos| match source {
            Some(source) => debug!("{} @ {:?} | {}", source, pos, text),
            None => debug!("{:?} | {}", pos, text),
        });

        let state = ScriptState::new();
        let mut scope = Scope::new();
        scope.push("devices", ScriptDevices::new(registry.clone()));
        scope.push("state", state.clone());

        Self {
            engine,
            scope,
            registry,
            state,
            tick,
        }
    }

    pub fn compile(&self, source: &str) -> Result<AST, ParseError> {
        self.engine.compile(source)
    }

    /// Runs the whole body in a fresh copy of the base scope
    pub fn run(&self, ast: &AST) -> Result<(), Box<EvalAltResult>> {
        let mut scope = self.scope.clone();
        self.engine.run_ast_with_scope(&mut scope, ast)
    }

    /// Runs the body once into `scope`, keeping its top-level variables
    pub fn load(&self, scope: &mut Scope<'static>, ast: &AST) -> Result<(), Box<EvalAltResult>> {
        self.engine.run_ast_with_scope(scope, ast)
    }

    /// Calls script function `name`, passing `devices` and `state` when it takes them
    pub fn call(
        &self,
        scope: &mut Scope<'static>,
        ast: &AST,
        name: &str,
        with_globals: bool,
    ) -> Result<(), Box<EvalAltResult>> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        // return values are discarded
        let _: Dynamic = if with_globals {
            let args = (self.devices(), self.state.clone());
            self.engine
                .call_fn_with_options(options, scope, ast, name, args)?
        } else {
            self.engine
                .call_fn_with_options(options, scope, ast, name, ())?
        };
        Ok(())
    }

    /// A fresh scope holding `devices` and `state`
    pub fn scope(&self) -> Scope<'static> {
        self.scope.clone()
    }

    pub fn devices(&self) -> ScriptDevices {
        ScriptDevices::new(self.registry.clone())
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn state(&self) -> &ScriptState {
        &self.state
    }

    pub fn set_tick(&self, tick: u64) {
        self.tick.set(tick);
    }
}
