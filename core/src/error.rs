//! Types d'erreurs pour OracleChain Core

use thiserror::Error;

/// Type de résultat standard pour le module core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Erreurs principales du module core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Erreur d'encodage: {0}")]
    Codec(#[from] CodecError),

    #[error("Erreur de paramètres: {0}")]
    Params(#[from] ParamsError),

    #[error("Erreur d'événement on-chain: {0}")]
    Events(#[from] EventsError),

    #[error("Erreur de chaîne: {0}")]
    Chain(#[from] ChainError),

    #[error("Erreur de dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Erreur de processing: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Erreur de portefeuille: {0}")]
    Wallet(#[from] WalletError),

    #[error("Erreur d'appel API: {0}")]
    Api(#[from] ApiCallError),

    #[error("Erreur de passerelle: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Erreur interne: {message}")]
    Internal { message: String },
}

/// Erreurs du codec de paramètres réservés
///
/// Toutes ces erreurs sont terminales pour la requête concernée
/// (catégorie DataError): elles ne sont jamais retentées.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Type réservé inconnu: {token}")]
    InvalidType { token: String },

    #[error("Chemin introuvable dans la réponse API: {path}")]
    PathNotFound { path: String },

    #[error("Valeur hors bornes pour {target}: {value}")]
    ValueOutOfRange { target: String, value: String },

    #[error("Valeur non convertible en {target}: {value}")]
    InvalidValue { target: String, value: String },

    #[error("Texte trop long pour 32 bytes ({len} bytes)")]
    TextTooLong { len: usize },

    #[error("Arité incohérente: {types} types pour {paths} chemins et {times} multiplicateurs")]
    ArityMismatch {
        types: usize,
        paths: usize,
        times: usize,
    },

    #[error("Tableau de longueur {actual}, attendu {expected}")]
    ArrayLengthMismatch { expected: usize, actual: usize },
}

/// Erreurs du codec de paramètres on-chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("Paramètres on-chain malformés (0x{bytes_hex}): {reason}")]
    Malformed { bytes_hex: String, reason: String },

    #[error("Version d'encodage non supportée: {version}")]
    UnsupportedVersion { version: char },

    #[error("Type de paramètre inconnu: {type_char}")]
    UnknownTypeChar { type_char: char },

    #[error("Nom de paramètre trop long ({len} bytes): {name}")]
    NameTooLong { name: String, len: usize },

    #[error("Trop de paramètres: {count} (maximum 31)")]
    TooManyParameters { count: usize },
}

/// Erreurs de classification/décodage des événements on-chain
#[derive(Error, Debug)]
pub enum EventsError {
    /// Topic non reconnu sur une requête filtrée: condition fatale,
    /// jamais traitée par requête.
    #[error("Topic d'événement inconnu: {topic}")]
    UnknownTopic { topic: String },

    #[error("Log sans topic")]
    MissingTopic,

    #[error("Arguments d'événement invalides pour {event}: {reason}")]
    InvalidArguments { event: String, reason: String },

    #[error("Log incomplet: champ {field} absent")]
    IncompleteLog { field: &'static str },
}

/// Erreurs de communication avec la chaîne
///
/// Catégorie TransportError: toujours retentable au cycle suivant,
/// ne change jamais le statut d'une requête.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Erreur RPC: {0}")]
    Rpc(String),

    #[error("Timeout RPC après {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transaction invalide: {reason}")]
    InvalidTransaction { reason: String },

    #[error("Signature de transaction échouée: {0}")]
    Signing(String),
}

/// Erreurs de la couche de dispatch
///
/// Uniquement les fautes de transport/infrastructure: un échec applicatif
/// de la fonction invoquée est un `DispatchResponse::Failed`, pas une erreur.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Erreur réseau vers la fonction distante: {0}")]
    Network(String),

    #[error("Enveloppe de réponse malformée: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Fonction distante indisponible: statut HTTP {status}")]
    RemoteUnavailable { status: u16 },

    #[error("Timeout de dispatch après {timeout_ms} ms pour {function}")]
    Timeout { function: String, timeout_ms: u64 },

    #[error("Erreur de sérialisation d'enveloppe: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Erreurs des étapes de processing sandboxées
///
/// Terminales pour la tentative de dispatch en cours; la requête
/// elle-même reste Pending et sera retentée au cycle suivant.
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    #[error("Compilation du module de processing échouée: {0}")]
    Compilation(String),

    #[error("Exécution de l'étape {step} échouée: {message}")]
    Execution { step: usize, message: String },

    #[error("Timeout de l'étape {step} après {timeout_ms} ms")]
    StepTimeout { step: usize, timeout_ms: u64 },

    #[error("Sortie de l'étape {step} invalide: {reason}")]
    InvalidOutput { step: usize, reason: String },
}

/// Erreurs de dérivation de portefeuille
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Clé étendue invalide: {0}")]
    InvalidExtendedKey(String),

    #[error("Graine invalide: {0}")]
    InvalidSeed(String),

    #[error("Dérivation d'enfant échouée à l'index {index}: {reason}")]
    Derivation { index: u32, reason: String },
}

/// Erreurs d'appel vers l'API cible
#[derive(Error, Debug)]
pub enum ApiCallError {
    #[error("Endpoint inconnu: {endpoint_id}")]
    UnknownEndpoint { endpoint_id: String },

    #[error("URL d'endpoint invalide: {0}")]
    InvalidUrl(String),

    #[error("Requête HTTP échouée: {0}")]
    Http(String),

    #[error("Réponse API non-JSON: {0}")]
    InvalidJson(String),

    #[error("Timeout de l'appel API après {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Erreurs de la passerelle HTTP (surface externe)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Origine non autorisée: {origin}")]
    OriginNotAllowed { origin: String },

    #[error("Corps de requête invalide: {reason}")]
    InvalidRequest { reason: String },

    #[error("Endpoint inconnu: {endpoint_id}")]
    UnknownEndpoint { endpoint_id: String },

    #[error("Échec du traitement de la requête: {message}")]
    Processing { message: String },
}
