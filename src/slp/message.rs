//! SLP token-type-1 message codec
//!
//! Encodes and parses the OP_RETURN protocol message carried at output 0
//! of a token transaction: lokad id `"SLP\0"`, token type `0x01`, an action
//! (GENESIS, MINT, or SEND), then the action's fields as data pushes.
//! Amounts are 8-byte big-endian; token ids are the genesis txid in display
//! order.
//!
//! Malformed messages are a recoverable condition (most transactions are
//! not token transactions); an action outside the three known kinds is
//! fatal, because it means the decoder is out of date with the protocol.

use thiserror::Error;

use crate::core::script::OP_RETURN;

const LOKAD_ID: &[u8] = b"SLP\x00";
const TOKEN_TYPE_1: u8 = 0x01;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// Maximum transfer amounts a SEND message may declare
pub const MAX_SEND_OUTPUTS: usize = 19;

/// SLP message errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlpError {
    /// Not a well-formed token message; the output is plain currency data.
    #[error("Malformed SLP message: {0}")]
    Malformed(&'static str),
    /// The protocol is closed over GENESIS/MINT/SEND; anything else means
    /// this decoder is stale and must not be masked.
    #[error("Unhandled SLP token kind: {0}")]
    UnhandledTokenKind(String),
}

/// A decoded token protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlpMessage {
    Genesis {
        ticker: Vec<u8>,
        name: Vec<u8>,
        doc_uri: Vec<u8>,
        doc_hash: Vec<u8>,
        decimals: u8,
        /// Output index of the minting baton, if one is declared
        baton_vout: Option<u8>,
        /// Initial supply, minted to output 1
        quantity: u64,
    },
    Mint {
        /// Genesis transaction id (display order)
        token_id: String,
        baton_vout: Option<u8>,
        quantity: u64,
    },
    Send {
        token_id: String,
        /// Transfer amount for output index `i + 1`
        amounts: Vec<u64>,
    },
}

impl SlpMessage {
    /// Encode into an OP_RETURN locking script
    pub fn encode(&self) -> Vec<u8> {
        let mut script = vec![OP_RETURN];
        push_data(&mut script, LOKAD_ID);
        push_data(&mut script, &[TOKEN_TYPE_1]);
        match self {
            SlpMessage::Genesis {
                ticker,
                name,
                doc_uri,
                doc_hash,
                decimals,
                baton_vout,
                quantity,
            } => {
                push_data(&mut script, b"GENESIS");
                push_data(&mut script, ticker);
                push_data(&mut script, name);
                push_data(&mut script, doc_uri);
                push_data(&mut script, doc_hash);
                push_data(&mut script, &[*decimals]);
                push_baton(&mut script, *baton_vout);
                push_data(&mut script, &quantity.to_be_bytes());
            }
            SlpMessage::Mint {
                token_id,
                baton_vout,
                quantity,
            } => {
                push_data(&mut script, b"MINT");
                push_data(&mut script, &token_id_bytes(token_id));
                push_baton(&mut script, *baton_vout);
                push_data(&mut script, &quantity.to_be_bytes());
            }
            SlpMessage::Send { token_id, amounts } => {
                push_data(&mut script, b"SEND");
                push_data(&mut script, &token_id_bytes(token_id));
                for amount in amounts {
                    push_data(&mut script, &amount.to_be_bytes());
                }
            }
        }
        script
    }

    /// Parse a locking script into a token message
    pub fn parse(script: &[u8]) -> Result<Self, SlpError> {
        if script.first() != Some(&OP_RETURN) {
            return Err(SlpError::Malformed("not an OP_RETURN output"));
        }
        let fields = read_pushes(&script[1..])?;
        if fields.len() < 3 {
            return Err(SlpError::Malformed("too few fields"));
        }
        if fields[0] != LOKAD_ID {
            return Err(SlpError::Malformed("missing lokad id"));
        }
        if fields[1] != [TOKEN_TYPE_1] {
            return Err(SlpError::Malformed("unsupported token type"));
        }

        match fields[2].as_slice() {
            b"GENESIS" => parse_genesis(&fields[3..]),
            b"MINT" => parse_mint(&fields[3..]),
            b"SEND" => parse_send(&fields[3..]),
            other => Err(SlpError::UnhandledTokenKind(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

fn parse_genesis(fields: &[Vec<u8>]) -> Result<SlpMessage, SlpError> {
    if fields.len() != 7 {
        return Err(SlpError::Malformed("genesis field count"));
    }
    if !(fields[3].is_empty() || fields[3].len() == 32) {
        return Err(SlpError::Malformed("genesis document hash length"));
    }
    if fields[4].len() != 1 || fields[4][0] > 9 {
        return Err(SlpError::Malformed("genesis decimals"));
    }
    Ok(SlpMessage::Genesis {
        ticker: fields[0].clone(),
        name: fields[1].clone(),
        doc_uri: fields[2].clone(),
        doc_hash: fields[3].clone(),
        decimals: fields[4][0],
        baton_vout: parse_baton(&fields[5])?,
        quantity: parse_amount(&fields[6])?,
    })
}

fn parse_mint(fields: &[Vec<u8>]) -> Result<SlpMessage, SlpError> {
    if fields.len() != 3 {
        return Err(SlpError::Malformed("mint field count"));
    }
    Ok(SlpMessage::Mint {
        token_id: parse_token_id(&fields[0])?,
        baton_vout: parse_baton(&fields[1])?,
        quantity: parse_amount(&fields[2])?,
    })
}

fn parse_send(fields: &[Vec<u8>]) -> Result<SlpMessage, SlpError> {
    if fields.is_empty() {
        return Err(SlpError::Malformed("send missing token id"));
    }
    let amounts = &fields[1..];
    if amounts.is_empty() || amounts.len() > MAX_SEND_OUTPUTS {
        return Err(SlpError::Malformed("send amount count"));
    }
    Ok(SlpMessage::Send {
        token_id: parse_token_id(&fields[0])?,
        amounts: amounts
            .iter()
            .map(|a| parse_amount(a))
            .collect::<Result<_, _>>()?,
    })
}

fn parse_token_id(field: &[u8]) -> Result<String, SlpError> {
    if field.len() != 32 {
        return Err(SlpError::Malformed("token id length"));
    }
    Ok(hex::encode(field))
}

fn parse_amount(field: &[u8]) -> Result<u64, SlpError> {
    let bytes: [u8; 8] = field
        .try_into()
        .map_err(|_| SlpError::Malformed("amount length"))?;
    Ok(u64::from_be_bytes(bytes))
}

fn parse_baton(field: &[u8]) -> Result<Option<u8>, SlpError> {
    match field {
        [] => Ok(None),
        // a baton at output 0 or 1 would collide with the message or the
        // token receiver, the protocol forbids it
        [vout] if *vout >= 2 => Ok(Some(*vout)),
        _ => Err(SlpError::Malformed("baton vout")),
    }
}

fn token_id_bytes(token_id: &str) -> Vec<u8> {
    // token ids flowing through this crate come from Transaction::txid;
    // fall back to raw bytes only for malformed test input
    hex::decode(token_id).unwrap_or_else(|_| token_id.as_bytes().to_vec())
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        // the protocol encodes an empty field as an explicit empty push
        0 => script.extend_from_slice(&[OP_PUSHDATA1, 0]),
        n @ 1..=0x4b => {
            script.push(n as u8);
            script.extend_from_slice(data);
        }
        n @ 0x4c..=0xff => {
            script.extend_from_slice(&[OP_PUSHDATA1, n as u8]);
            script.extend_from_slice(data);
        }
        n => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(n as u16).to_le_bytes());
            script.extend_from_slice(data);
        }
    }
}

fn push_baton(script: &mut Vec<u8>, baton_vout: Option<u8>) {
    match baton_vout {
        Some(vout) => push_data(script, &[vout]),
        None => push_data(script, &[]),
    }
}

fn read_pushes(mut bytes: &[u8]) -> Result<Vec<Vec<u8>>, SlpError> {
    let mut fields = Vec::new();
    while let Some((&opcode, rest)) = bytes.split_first() {
        let (len, rest) = match opcode {
            1..=0x4b => (opcode as usize, rest),
            OP_PUSHDATA1 => {
                let (&len, rest) = rest
                    .split_first()
                    .ok_or(SlpError::Malformed("truncated pushdata1"))?;
                (len as usize, rest)
            }
            OP_PUSHDATA2 => {
                if rest.len() < 2 {
                    return Err(SlpError::Malformed("truncated pushdata2"));
                }
                let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
                (len, &rest[2..])
            }
            _ => return Err(SlpError::Malformed("non-push opcode in message")),
        };
        if rest.len() < len {
            return Err(SlpError::Malformed("push exceeds script"));
        }
        fields.push(rest[..len].to_vec());
        bytes = &rest[len..];
    }
    Ok(fields)
}
