//! Classification et décodage des logs on-chain
//!
//! Un log est classé par son premier topic. Comme les logs proviennent de
//! requêtes filtrées sur nos propres topics, un topic inconnu est une
//! condition d'erreur de programmation, fatale pour le cycle, jamais
//! traitée par requête.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, H256};

use crate::error::EventsError;
use crate::evm::contracts;

/// Genre d'événement reconnu par le décodeur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MadeApiRequest,
    MadeTemplateRequest,
    FulfilledApiRequest,
    FailedApiRequest,
    RequestedWithdrawal,
    FulfilledWithdrawal,
}

/// Classe un log par son topic
pub fn classify(log: &Log) -> Result<EventKind, EventsError> {
    let topic = log.topics.first().ok_or(EventsError::MissingTopic)?;
    if *topic == contracts::event_topic(contracts::MADE_API_REQUEST_SIG) {
        Ok(EventKind::MadeApiRequest)
    } else if *topic == contracts::event_topic(contracts::MADE_TEMPLATE_REQUEST_SIG) {
        Ok(EventKind::MadeTemplateRequest)
    } else if *topic == contracts::event_topic(contracts::FULFILLED_API_REQUEST_SIG) {
        Ok(EventKind::FulfilledApiRequest)
    } else if *topic == contracts::event_topic(contracts::FAILED_API_REQUEST_SIG) {
        Ok(EventKind::FailedApiRequest)
    } else if *topic == contracts::event_topic(contracts::REQUESTED_WITHDRAWAL_SIG) {
        Ok(EventKind::RequestedWithdrawal)
    } else if *topic == contracts::event_topic(contracts::FULFILLED_WITHDRAWAL_SIG) {
        Ok(EventKind::FulfilledWithdrawal)
    } else {
        Err(EventsError::UnknownTopic {
            topic: format!("{topic:#x}"),
        })
    }
}

/// Événement de création d'appel API, gabarit ou complet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequestEvent {
    pub operator: Address,
    pub request_id: H256,
    /// endpointId pour une requête complète, templateId pour un gabarit
    pub target_id: H256,
    pub sponsor: Address,
    pub sponsor_wallet: Address,
    pub fulfill_address: Address,
    pub fulfill_function_id: [u8; 4],
    pub parameters: Bytes,
    pub block_number: u64,
    pub transaction_hash: H256,
}

/// Événement de demande de retrait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequestEvent {
    pub operator: Address,
    pub sponsor: Address,
    pub withdrawal_request_id: H256,
    pub sponsor_wallet: Address,
    pub destination: Address,
    pub block_number: u64,
    pub transaction_hash: H256,
}

/// Événement décodé et typé
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    ApiRequest(ApiRequestEvent),
    TemplateRequest(ApiRequestEvent),
    ApiFulfilled { request_id: H256 },
    ApiFailed { request_id: H256 },
    WithdrawalRequested(WithdrawalRequestEvent),
    WithdrawalFulfilled { withdrawal_request_id: H256 },
}

fn log_block_number(log: &Log) -> Result<u64, EventsError> {
    log.block_number
        .map(|n| n.as_u64())
        .ok_or(EventsError::IncompleteLog {
            field: "block_number",
        })
}

fn log_transaction_hash(log: &Log) -> Result<H256, EventsError> {
    log.transaction_hash.ok_or(EventsError::IncompleteLog {
        field: "transaction_hash",
    })
}

fn indexed_topic(log: &Log, index: usize, event: &str) -> Result<H256, EventsError> {
    log.topics
        .get(index)
        .copied()
        .ok_or_else(|| EventsError::InvalidArguments {
            event: event.to_string(),
            reason: format!("topic indexé {index} absent"),
        })
}

fn decode_data(log: &Log, types: &[ParamType], event: &str) -> Result<Vec<Token>, EventsError> {
    abi::decode(types, &log.data).map_err(|e| EventsError::InvalidArguments {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn decode_api_request(log: &Log, event: &str) -> Result<ApiRequestEvent, EventsError> {
    let invalid = |reason: &str| EventsError::InvalidArguments {
        event: event.to_string(),
        reason: reason.to_string(),
    };

    let operator = Address::from(indexed_topic(log, 1, event)?);
    let request_id = indexed_topic(log, 2, event)?;

    let tokens = decode_data(
        log,
        &[
            ParamType::FixedBytes(32),
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::FixedBytes(4),
            ParamType::Bytes,
        ],
        event,
    )?;

    let mut iter = tokens.into_iter();
    let target_id = match iter.next() {
        Some(Token::FixedBytes(w)) if w.len() == 32 => H256::from_slice(&w),
        _ => return Err(invalid("identifiant de cible")),
    };
    let sponsor = match iter.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(invalid("sponsor")),
    };
    let sponsor_wallet = match iter.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(invalid("sponsorWallet")),
    };
    let fulfill_address = match iter.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(invalid("fulfillAddress")),
    };
    let fulfill_function_id = match iter.next() {
        Some(Token::FixedBytes(w)) if w.len() == 4 => [w[0], w[1], w[2], w[3]],
        _ => return Err(invalid("fulfillFunctionId")),
    };
    let parameters = match iter.next() {
        Some(Token::Bytes(b)) => Bytes::from(b),
        _ => return Err(invalid("parameters")),
    };

    Ok(ApiRequestEvent {
        operator,
        request_id,
        target_id,
        sponsor,
        sponsor_wallet,
        fulfill_address,
        fulfill_function_id,
        parameters,
        block_number: log_block_number(log)?,
        transaction_hash: log_transaction_hash(log)?,
    })
}

fn decode_withdrawal_request(log: &Log) -> Result<WithdrawalRequestEvent, EventsError> {
    let event = "RequestedWithdrawal";
    let invalid = |reason: &str| EventsError::InvalidArguments {
        event: event.to_string(),
        reason: reason.to_string(),
    };

    let operator = Address::from(indexed_topic(log, 1, event)?);
    let sponsor = Address::from(indexed_topic(log, 2, event)?);
    let withdrawal_request_id = indexed_topic(log, 3, event)?;

    let tokens = decode_data(log, &[ParamType::Address, ParamType::Address], event)?;
    let mut iter = tokens.into_iter();
    let sponsor_wallet = match iter.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(invalid("sponsorWallet")),
    };
    let destination = match iter.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(invalid("destination")),
    };

    Ok(WithdrawalRequestEvent {
        operator,
        sponsor,
        withdrawal_request_id,
        sponsor_wallet,
        destination,
        block_number: log_block_number(log)?,
        transaction_hash: log_transaction_hash(log)?,
    })
}

/// Décode un log classé en événement typé
pub fn decode_log(log: &Log) -> Result<ChainEvent, EventsError> {
    match classify(log)? {
        EventKind::MadeApiRequest => Ok(ChainEvent::ApiRequest(decode_api_request(
            log,
            "MadeApiRequest",
        )?)),
        EventKind::MadeTemplateRequest => Ok(ChainEvent::TemplateRequest(decode_api_request(
            log,
            "MadeTemplateRequest",
        )?)),
        EventKind::FulfilledApiRequest => Ok(ChainEvent::ApiFulfilled {
            request_id: indexed_topic(log, 2, "FulfilledApiRequest")?,
        }),
        EventKind::FailedApiRequest => Ok(ChainEvent::ApiFailed {
            request_id: indexed_topic(log, 2, "FailedApiRequest")?,
        }),
        EventKind::RequestedWithdrawal => Ok(ChainEvent::WithdrawalRequested(
            decode_withdrawal_request(log)?,
        )),
        EventKind::FulfilledWithdrawal => Ok(ChainEvent::WithdrawalFulfilled {
            withdrawal_request_id: indexed_topic(log, 3, "FulfilledWithdrawal")?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U64;

    pub(crate) fn api_request_log(request_id: H256, parameters: &[u8]) -> Log {
        let data = abi::encode(&[
            Token::FixedBytes(H256::repeat_byte(0xee).as_bytes().to_vec()),
            Token::Address(Address::repeat_byte(1)),
            Token::Address(Address::repeat_byte(2)),
            Token::Address(Address::repeat_byte(3)),
            Token::FixedBytes(vec![0xde, 0xad, 0xbe, 0xef]),
            Token::Bytes(parameters.to_vec()),
        ]);
        Log {
            address: Address::repeat_byte(9),
            topics: vec![
                contracts::event_topic(contracts::MADE_API_REQUEST_SIG),
                H256::from(Address::repeat_byte(7)),
                request_id,
            ],
            data: data.into(),
            block_number: Some(U64::from(120u64)),
            transaction_hash: Some(H256::repeat_byte(0xaa)),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_known_topics() {
        let log = api_request_log(H256::repeat_byte(5), &[]);
        assert_eq!(classify(&log).unwrap(), EventKind::MadeApiRequest);
    }

    #[test]
    fn test_unknown_topic_is_fatal() {
        let mut log = api_request_log(H256::zero(), &[]);
        log.topics[0] = H256::repeat_byte(0x42);
        assert!(matches!(
            classify(&log),
            Err(EventsError::UnknownTopic { .. })
        ));
    }

    #[test]
    fn test_missing_topic() {
        let mut log = api_request_log(H256::zero(), &[]);
        log.topics.clear();
        assert!(matches!(classify(&log), Err(EventsError::MissingTopic)));
    }

    #[test]
    fn test_decode_api_request() {
        let request_id = H256::repeat_byte(5);
        let log = api_request_log(request_id, &[1, 2, 3]);
        match decode_log(&log).unwrap() {
            ChainEvent::ApiRequest(event) => {
                assert_eq!(event.request_id, request_id);
                assert_eq!(event.operator, Address::repeat_byte(7));
                assert_eq!(event.target_id, H256::repeat_byte(0xee));
                assert_eq!(event.sponsor, Address::repeat_byte(1));
                assert_eq!(event.sponsor_wallet, Address::repeat_byte(2));
                assert_eq!(event.fulfill_address, Address::repeat_byte(3));
                assert_eq!(event.fulfill_function_id, [0xde, 0xad, 0xbe, 0xef]);
                assert_eq!(event.parameters.as_ref(), &[1, 2, 3]);
                assert_eq!(event.block_number, 120);
            }
            other => panic!("ApiRequest attendu, reçu {other:?}"),
        }
    }

    #[test]
    fn test_decode_fulfilled() {
        let request_id = H256::repeat_byte(6);
        let log = Log {
            topics: vec![
                contracts::event_topic(contracts::FULFILLED_API_REQUEST_SIG),
                H256::from(Address::repeat_byte(7)),
                request_id,
            ],
            data: abi::encode(&[Token::Uint(0u8.into()), Token::Bytes(vec![])]).into(),
            block_number: Some(U64::from(1u64)),
            transaction_hash: Some(H256::zero()),
            ..Default::default()
        };
        assert_eq!(
            decode_log(&log).unwrap(),
            ChainEvent::ApiFulfilled { request_id }
        );
    }

    #[test]
    fn test_decode_withdrawal_request() {
        let data = abi::encode(&[
            Token::Address(Address::repeat_byte(2)),
            Token::Address(Address::repeat_byte(4)),
        ]);
        let log = Log {
            topics: vec![
                contracts::event_topic(contracts::REQUESTED_WITHDRAWAL_SIG),
                H256::from(Address::repeat_byte(7)),
                H256::from(Address::repeat_byte(1)),
                H256::repeat_byte(0xcc),
            ],
            data: data.into(),
            block_number: Some(U64::from(9u64)),
            transaction_hash: Some(H256::zero()),
            ..Default::default()
        };
        match decode_log(&log).unwrap() {
            ChainEvent::WithdrawalRequested(event) => {
                assert_eq!(event.sponsor, Address::repeat_byte(1));
                assert_eq!(event.sponsor_wallet, Address::repeat_byte(2));
                assert_eq!(event.destination, Address::repeat_byte(4));
                assert_eq!(event.withdrawal_request_id, H256::repeat_byte(0xcc));
            }
            other => panic!("WithdrawalRequested attendu, reçu {other:?}"),
        }
    }

    #[test]
    fn test_malformed_data_is_invalid_arguments() {
        let mut log = api_request_log(H256::zero(), &[]);
        log.data = Bytes::from(vec![0u8; 7]);
        assert!(matches!(
            decode_log(&log),
            Err(EventsError::InvalidArguments { .. })
        ));
    }
}
