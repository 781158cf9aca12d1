use serde::Serialize;
use serde_json::Value;

/// Insumos del fingerprint de un step. NO es el fingerprint final (string
/// hash) sino el modelo previo a canonicalizar.
#[derive(Serialize)]
pub struct StepFingerprintInput<'a> {
    pub engine_version: &'a str,
    pub definition_hash: &'a str,
    pub step_index: usize,
    pub step_id: &'a str,
    pub input_hashes: &'a [String], // ordenadas lexicográficamente
    pub output_hashes: &'a [String],
    pub params: &'a Value,
}
