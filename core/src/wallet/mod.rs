//! Dérivation déterministe des portefeuilles de sponsor
//!
//! L'adresse de 160 bits du sponsor est découpée en six morceaux de
//! 31 bits (pour éviter l'ambiguïté du bit de durcissement des segments de
//! 32 bits) utilisés comme indices d'enfants successifs sous le segment
//! racine du protocole. La même paire (clé d'opérateur, sponsor) produit
//! toujours le même portefeuille: un sponsor peut pré-financer le
//! portefeuille qui répondra à ses requêtes en le calculant lui-même
//! depuis la clé publique étendue publiée par l'opérateur.

use coins_bip32::enc::{MainnetEncoder, XKeyEncoder};
use coins_bip32::xkeys::{Parent, XPriv, XPub};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::WalletError;

/// Segment racine du protocole requête-réponse
pub const PROTOCOL_ID: u32 = 1;

/// Chemin du compte opérateur sous la clé maîtresse
pub const ACCOUNT_PATH: &str = "m/44'/60'/0'";

const CHUNK_BITS: usize = 31;
const CHUNK_COUNT: usize = 6;

/// Découpe une adresse de sponsor en six segments de chemin de 31 bits
///
/// Little-endian: le premier segment porte les bits de poids faible.
pub fn sponsor_path_segments(sponsor: Address) -> [u32; CHUNK_COUNT] {
    let value = U256::from_big_endian(sponsor.as_bytes());
    let mask = U256::from((1u64 << CHUNK_BITS) - 1);
    let mut segments = [0u32; CHUNK_COUNT];
    for (i, segment) in segments.iter_mut().enumerate() {
        *segment = ((value >> (CHUNK_BITS * i)) & mask).as_u32();
    }
    segments
}

fn address_of_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

fn derive_error(index: u32, e: impl std::fmt::Display) -> WalletError {
    WalletError::Derivation {
        index,
        reason: e.to_string(),
    }
}

/// Calcule l'adresse du portefeuille de sponsor depuis la clé publique
/// étendue publiée (fonction pure, côté sponsor)
pub fn derive_sponsor_wallet_address(
    extended_public_key: &str,
    sponsor: Address,
) -> Result<Address, WalletError> {
    let account: XPub = MainnetEncoder::xpub_from_base58(extended_public_key)
        .map_err(|e| WalletError::InvalidExtendedKey(e.to_string()))?;

    let mut node = account
        .derive_child(PROTOCOL_ID)
        .map_err(|e| derive_error(PROTOCOL_ID, e))?;
    for segment in sponsor_path_segments(sponsor) {
        node = node
            .derive_child(segment)
            .map_err(|e| derive_error(segment, e))?;
    }

    let key: &VerifyingKey = node.as_ref();
    Ok(address_of_verifying_key(key))
}

/// Clé maîtresse de l'opérateur, côté nœud
#[derive(Clone)]
pub struct MasterKey {
    account: XPriv,
}

impl MasterKey {
    /// Dérive le compte opérateur depuis une graine
    pub fn from_seed(seed: &[u8]) -> Result<Self, WalletError> {
        let root = XPriv::root_from_seed(seed, None)
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        let account = root
            .derive_path(ACCOUNT_PATH)
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        Ok(Self { account })
    }

    /// Clé publique étendue du compte, à publier pour les sponsors
    pub fn extended_public_key(&self) -> Result<String, WalletError> {
        MainnetEncoder::xpub_to_base58(&self.account.verify_key())
            .map_err(|e| WalletError::InvalidExtendedKey(e.to_string()))
    }

    fn derive_signing_key(&self, path: &[u32]) -> Result<SigningKey, WalletError> {
        let mut node = self.account.clone();
        for index in path {
            node = node
                .derive_child(*index)
                .map_err(|e| derive_error(*index, e))?;
        }
        let key: &SigningKey = node.as_ref();
        Ok(key.clone())
    }

    /// Signataire du portefeuille de sponsor pour la chaîne donnée
    pub fn sponsor_signer(
        &self,
        sponsor: Address,
        chain_id: u64,
    ) -> Result<LocalWallet, WalletError> {
        let mut path = vec![PROTOCOL_ID];
        path.extend(sponsor_path_segments(sponsor));
        let key = self.derive_signing_key(&path)?;
        Ok(LocalWallet::from(key).with_chain_id(chain_id))
    }

    /// Signataire d'attestation des réponses API (enfant 0/0 du compte)
    pub fn attestor_signer(&self, chain_id: u64) -> Result<LocalWallet, WalletError> {
        let key = self.derive_signing_key(&[0, 0])?;
        Ok(LocalWallet::from(key).with_chain_id(chain_id))
    }

    /// Adresse du signataire d'attestation
    pub fn attestor_address(&self) -> Result<Address, WalletError> {
        Ok(self.attestor_signer(1)?.address())
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // La clé privée ne sort jamais dans les logs
        f.debug_struct("MasterKey").finish_non_exhaustive()
    }
}
