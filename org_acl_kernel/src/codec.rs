/// Organization ACL Kernel: Call Codec
///
/// Stand-in for contract ABI encoding. It is deterministic and reversible
/// enough to nest calls, which is all plan construction needs.
///
/// Call data:      selector(4) ++ canonical JSON of the argument array
/// Call script:    spec id 00000001 ++ (address(20) ++ len u32 BE ++ data)*
/// Forward data:   selector("forward(bytes)") ++ call script
///
/// Selectors are the first four bytes of SHA-256 over the signature.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::address::{address_bytes, ADDRESS_BYTES};
use crate::domain::{Entity, ExecutionStep, MethodDescriptor};
use crate::error::AclError;

pub const CALLSCRIPT_SPEC_ID: [u8; 4] = [0, 0, 0, 1];
pub const FORWARD_SIGNATURE: &str = "forward(bytes)";

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Sha256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn encode_call(method: &MethodDescriptor, args: &[Value]) -> Vec<u8> {
    let mut data = selector(&method.signature).to_vec();
    data.extend_from_slice(Value::Array(args.to_vec()).to_string().as_bytes());
    data
}

/// Pack steps into a call script. Every `to` must be a well-formed address.
pub fn encode_call_script(steps: &[ExecutionStep]) -> Result<Vec<u8>, AclError> {
    let mut script = CALLSCRIPT_SPEC_ID.to_vec();
    for step in steps {
        let len = u32::try_from(step.data.len()).map_err(|_| {
            AclError::InvalidScript(format!("call data to {} exceeds u32 length", step.to))
        })?;
        script.extend_from_slice(&address_bytes(&step.to)?);
        script.extend_from_slice(&len.to_be_bytes());
        script.extend_from_slice(&step.data);
    }
    Ok(script)
}

/// Unpack a call script into (address, data) pairs.
pub fn decode_call_script(script: &[u8]) -> Result<Vec<(String, Vec<u8>)>, AclError> {
    let body = script
        .strip_prefix(&CALLSCRIPT_SPEC_ID)
        .ok_or_else(|| AclError::InvalidScript("unknown call script spec id".to_string()))?;

    let mut calls = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        if rest.len() < ADDRESS_BYTES + 4 {
            return Err(AclError::InvalidScript("truncated call header".to_string()));
        }
        let (address, tail) = rest.split_at(ADDRESS_BYTES);
        let (len_bytes, tail) = tail.split_at(4);
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if tail.len() < len {
            return Err(AclError::InvalidScript("truncated call data".to_string()));
        }
        let (data, tail) = tail.split_at(len);
        calls.push((format!("0x{}", hex::encode(address)), data.to_vec()));
        rest = tail;
    }
    Ok(calls)
}

pub fn encode_forward(script: &[u8]) -> Vec<u8> {
    let mut data = selector(FORWARD_SIGNATURE).to_vec();
    data.extend_from_slice(script);
    data
}

/// Inverse of `encode_forward`: the call script a forward call carries.
pub fn decode_forward(data: &[u8]) -> Result<&[u8], AclError> {
    data.strip_prefix(&selector(FORWARD_SIGNATURE))
        .ok_or_else(|| AclError::InvalidScript("not a forward call".to_string()))
}

/// Wrap `inner` in a `forward(script)` call to `forwarder`. Also returns the
/// script, which is what the forwarder is asked to relay.
pub fn forward_step(
    forwarder: &Entity,
    inner: &ExecutionStep,
) -> Result<(ExecutionStep, Vec<u8>), AclError> {
    let script = encode_call_script(std::slice::from_ref(inner))?;
    let step = ExecutionStep {
        to: forwarder.address.clone(),
        data: encode_forward(&script),
        description: Some(format!("Forward through {}", forwarder.app_id)),
    };
    Ok((step, script))
}
