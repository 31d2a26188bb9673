//! Sandbox WASM des étapes de processing
//!
//! Chaque invocation reçoit uniquement la valeur d'entrée et s'exécute dans
//! un `Store` neuf: deux requêtes concurrentes ne partagent jamais de
//! contexte. Le module invité n'a aucune capacité d'E/S ni d'accès au
//! système de fichiers; il ne voit que sa mémoire linéaire.
//!
//! Convention d'invité:
//! - export `memory`: mémoire linéaire
//! - export `alloc(len: i32) -> i32`: réserve un tampon d'entrée
//! - environnement synchrone: export `transform(ptr, len) -> i64`, le
//!   résultat empaquette `(ptr << 32) | len` de la sortie
//! - environnement asynchrone: export `transform_async(ptr, len)` qui
//!   appelle l'import `env.resolve(ptr, len)` exactement une fois; le
//!   premier appel gagne, les suivants sont ignorés

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wasmer::{
    imports, Cranelift, Engine, Function, FunctionEnv, FunctionEnvMut, Instance, Memory, Module,
    Store, TypedFunction,
};

use crate::error::ProcessingError;

/// Taille maximale acceptée pour l'entrée ou la sortie d'une étape
pub const MAX_IO_BYTES: usize = 8 * 1024 * 1024;

/// Environnement d'exécution d'une étape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// L'étape retourne sa sortie directement
    Sync,
    /// L'étape résout sa sortie par le rappel `resolve`
    Async,
}

/// Runtime de sandbox avec cache de modules compilés
pub struct Sandbox {
    engine: Engine,
    compiled: Mutex<HashMap<[u8; 32], Module>>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ResolveEnv {
    memory: Option<Memory>,
    output: Arc<Mutex<Option<Vec<u8>>>>,
}

fn resolve_host(mut ctx: FunctionEnvMut<ResolveEnv>, ptr: u32, len: u32) {
    let (data, store) = ctx.data_and_store_mut();
    let memory = match &data.memory {
        Some(m) => m.clone(),
        None => return,
    };
    if len as usize > MAX_IO_BYTES {
        return;
    }
    let view = memory.view(&store);
    let mut buffer = vec![0u8; len as usize];
    if view.read(ptr as u64, &mut buffer).is_ok() {
        let mut slot = data.output.lock().unwrap();
        // Contrat "resolve exactement une fois": le premier appel gagne
        if slot.is_none() {
            *slot = Some(buffer);
        }
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            engine: Cranelift::default().into(),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    fn module_for(&self, bytecode: &[u8], step: usize) -> Result<Module, ProcessingError> {
        let key = *blake3::hash(bytecode).as_bytes();
        if let Some(module) = self.compiled.lock().unwrap().get(&key) {
            return Ok(module.clone());
        }
        let module = Module::new(&self.engine, bytecode).map_err(|e| {
            ProcessingError::Compilation(format!("étape {step}: {e}"))
        })?;
        self.compiled.lock().unwrap().insert(key, module.clone());
        Ok(module)
    }

    /// Exécute une étape sur des bytes d'entrée (appel bloquant)
    ///
    /// Le délai est imposé par l'appelant autour de cette fonction; un
    /// dépassement abandonne l'attente sans rétracter l'exécution.
    pub fn execute(
        &self,
        bytecode: &[u8],
        environment: Environment,
        input: &[u8],
        step: usize,
    ) -> Result<Vec<u8>, ProcessingError> {
        let exec_err = |message: String| ProcessingError::Execution { step, message };
        let bad_output = |reason: String| ProcessingError::InvalidOutput { step, reason };

        if input.len() > MAX_IO_BYTES {
            return Err(exec_err(format!("entrée de {} bytes", input.len())));
        }

        let module = self.module_for(bytecode, step)?;

        // Store neuf: aucun état partagé entre invocations
        let mut store = Store::new(self.engine.clone());
        let output_slot: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
        let env = FunctionEnv::new(
            &mut store,
            ResolveEnv {
                memory: None,
                output: output_slot.clone(),
            },
        );
        let resolve = Function::new_typed_with_env(&mut store, &env, resolve_host);
        let imports = imports! {
            "env" => {
                "resolve" => resolve,
            }
        };

        let instance = Instance::new(&mut store, &module, &imports)
            .map_err(|e| exec_err(format!("instanciation: {e}")))?;

        let memory = instance
            .exports
            .get_memory("memory")
            .map_err(|e| exec_err(format!("mémoire absente: {e}")))?
            .clone();
        env.as_mut(&mut store).memory = Some(memory.clone());

        let alloc: TypedFunction<u32, u32> = instance
            .exports
            .get_typed_function(&store, "alloc")
            .map_err(|e| exec_err(format!("export alloc: {e}")))?;
        let input_ptr = alloc
            .call(&mut store, input.len() as u32)
            .map_err(|e| exec_err(format!("alloc: {e}")))?;

        memory
            .view(&store)
            .write(input_ptr as u64, input)
            .map_err(|e| exec_err(format!("écriture d'entrée: {e}")))?;

        match environment {
            Environment::Sync => {
                let transform: TypedFunction<(u32, u32), i64> = instance
                    .exports
                    .get_typed_function(&store, "transform")
                    .map_err(|e| exec_err(format!("export transform: {e}")))?;
                let packed = transform
                    .call(&mut store, input_ptr, input.len() as u32)
                    .map_err(|e| exec_err(e.to_string()))?;

                let out_ptr = (packed as u64 >> 32) as u32;
                let out_len = (packed as u64 & 0xffff_ffff) as usize;
                if out_len > MAX_IO_BYTES {
                    return Err(bad_output(format!("sortie de {out_len} bytes")));
                }
                let mut output = vec![0u8; out_len];
                memory
                    .view(&store)
                    .read(out_ptr as u64, &mut output)
                    .map_err(|e| bad_output(format!("lecture de sortie: {e}")))?;
                Ok(output)
            }
            Environment::Async => {
                let transform: TypedFunction<(u32, u32), ()> = instance
                    .exports
                    .get_typed_function(&store, "transform_async")
                    .map_err(|e| exec_err(format!("export transform_async: {e}")))?;
                transform
                    .call(&mut store, input_ptr, input.len() as u32)
                    .map_err(|e| exec_err(e.to_string()))?;

                let output = output_slot.lock().unwrap().take();
                output.ok_or_else(|| bad_output("resolve jamais appelé".to_string()))
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}
