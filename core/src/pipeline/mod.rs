//! Pipeline de traitement des requêtes
//!
//! De la fenêtre de logs bruts à l'état prêt pour la cascade: décodage,
//! politique d'âge, agrégation à travers les connexions et désagrégation
//! des résultats.

pub mod aggregation;
pub mod disaggregation;
pub mod initialize;
pub mod state;

// Re-exports pour l'interface publique
pub use aggregation::{aggregate, index_by_request_id, AggregatedApiCall, AggregatedResult};
pub use disaggregation::disaggregate;
pub use initialize::build_connection_state;
pub use state::ProviderConnectionState;
