pub mod evidence_codes;
pub mod harvest;
