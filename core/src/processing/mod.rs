//! Chaînes de pré/post-processing
//!
//! Zéro ou plusieurs étapes ordonnées, chacune nommant son environnement
//! d'exécution et son module sandboxé. Les étapes se composent de gauche à
//! droite, chacune consommant la sortie de la précédente. Un délai borné
//! s'applique par étape; le dépasser fait échouer toute la chaîne sans
//! résultat partiel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::codec::is_reserved_name;
use crate::error::ProcessingError;
use crate::params::Parameter;
use crate::sandbox::{Environment, Sandbox};

/// Délai par défaut d'une étape en millisecondes
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;

/// Spécification d'une étape de processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSpec {
    pub environment: Environment,
    /// Bytecode WASM du module, encodé en hexadécimal
    pub module_hex: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

impl ProcessingSpec {
    pub fn new(environment: Environment, bytecode: &[u8], timeout_ms: u64) -> Self {
        Self {
            environment,
            module_hex: hex::encode(bytecode),
            timeout_ms,
        }
    }

    fn bytecode(&self, step: usize) -> Result<Vec<u8>, ProcessingError> {
        hex::decode(&self.module_hex)
            .map_err(|e| ProcessingError::Compilation(format!("étape {step}: hex invalide: {e}")))
    }
}

async fn run_one_step(
    sandbox: &Arc<Sandbox>,
    spec: &ProcessingSpec,
    input: Vec<u8>,
    step: usize,
) -> Result<Vec<u8>, ProcessingError> {
    let bytecode = spec.bytecode(step)?;
    let environment = spec.environment;
    let sandbox = Arc::clone(sandbox);

    // Producteur unique sur un canal à coup unique; le délai abandonne
    // l'attente sans rétracter l'exécution en cours
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let result = sandbox.execute(&bytecode, environment, &input, step);
        let _ = tx.send(result);
    });

    match tokio::time::timeout(Duration::from_millis(spec.timeout_ms), rx).await {
        Err(_) => Err(ProcessingError::StepTimeout {
            step,
            timeout_ms: spec.timeout_ms,
        }),
        Ok(Err(_)) => Err(ProcessingError::Execution {
            step,
            message: "producteur disparu avant résolution".to_string(),
        }),
        Ok(Ok(result)) => result,
    }
}

/// Exécute une chaîne d'étapes sur une valeur JSON
pub async fn run_steps(
    sandbox: &Arc<Sandbox>,
    specs: &[ProcessingSpec],
    input: Value,
) -> Result<Value, ProcessingError> {
    let mut current = input;
    for (step, spec) in specs.iter().enumerate() {
        let input_bytes = serde_json::to_vec(&current).map_err(|e| {
            ProcessingError::Execution {
                step,
                message: format!("sérialisation d'entrée: {e}"),
            }
        })?;
        let output_bytes = run_one_step(sandbox, spec, input_bytes, step).await?;
        current = serde_json::from_slice(&output_bytes).map_err(|e| {
            ProcessingError::InvalidOutput {
                step,
                reason: format!("sortie non-JSON: {e}"),
            }
        })?;
    }
    Ok(current)
}

/// Projette des paramètres typés en objet JSON pour le processing
pub fn parameters_to_json(params: &[Parameter]) -> Map<String, Value> {
    params
        .iter()
        .map(|p| (p.name.clone(), p.value.to_json()))
        .collect()
}

/// Point d'entrée côté HTTP: pré-processing avec mise à l'écart des
/// paramètres réservés
///
/// Les paramètres réservés sont retirés avant le pré-processing et
/// réinsérés après: un appelant externe ne peut pas faire passer de
/// paramètre réservé en contrebande dans du code de processing fourni par
/// l'utilisateur.
pub async fn pre_process_parameters(
    sandbox: &Arc<Sandbox>,
    specs: &[ProcessingSpec],
    parameters: Map<String, Value>,
) -> Result<Map<String, Value>, ProcessingError> {
    let mut reserved = Map::new();
    let mut ordinary = Map::new();
    for (name, value) in parameters {
        if is_reserved_name(&name) {
            reserved.insert(name, value);
        } else {
            ordinary.insert(name, value);
        }
    }

    let processed = run_steps(sandbox, specs, Value::Object(ordinary)).await?;
    let mut output = match processed {
        Value::Object(map) => map,
        other => {
            return Err(ProcessingError::InvalidOutput {
                step: specs.len().saturating_sub(1),
                reason: format!("objet attendu, reçu {other}"),
            })
        }
    };

    // Toute clé réservée émise par le code de processing est écartée
    output.retain(|name, _| !is_reserved_name(name));
    output.extend(reserved);
    Ok(output)
}

/// Post-processing de la charge utile brute de l'API avant encodage
pub async fn post_process_response(
    sandbox: &Arc<Sandbox>,
    specs: &[ProcessingSpec],
    response: Value,
) -> Result<Value, ProcessingError> {
    run_steps(sandbox, specs, response).await
}
