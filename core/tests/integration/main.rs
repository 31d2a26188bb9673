//! Tests d'intégration du pipeline OracleChain
//!
//! Cycle complet avec dispatch local, client de chaîne en mémoire et stub
//! HTTP d'API sur la boucle locale.

mod helpers;

mod cascade;
mod end_to_end;
