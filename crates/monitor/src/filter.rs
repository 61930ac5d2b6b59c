//! Co-signature filter.
//!
//! A target program's instruction is only an application event when a
//! signature-verification instruction rides in the same transaction, which
//! shows up as the secp program among the account keys. Transactions
//! without that companion are skipped silently, not reported as errors.

use sigtail_domain::model::ProgramAddress;

use crate::rpc::{RawInstruction, RawTransaction};

/// Returns the target program's index within `tx.account_keys`, but only
/// when the secp program also appears among the keys.
pub fn co_signed_program_index(
    tx: &RawTransaction,
    secp_program: &ProgramAddress,
    target_program: &ProgramAddress,
) -> Option<usize> {
    if !tx
        .account_keys
        .iter()
        .any(|key| key == secp_program.as_str())
    {
        return None;
    }

    tx.account_keys
        .iter()
        .position(|key| key == target_program.as_str())
}

/// Yields the instructions addressed to `program_index`, in transaction
/// order.
pub fn matching_instructions(
    tx: &RawTransaction,
    program_index: usize,
) -> impl Iterator<Item = &RawInstruction> {
    tx.instructions
        .iter()
        .filter(move |instruction| instruction.program_id_index == program_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECP: &str = "KeccakSecp256k11111111111111111111111111111";
    const TARGET: &str = "3QqhXLvBgPZ4DCV3YjyzpiQWfeR4Lf2bSKqSnj5c8wkE";
    const OTHER: &str = "11111111111111111111111111111111";

    fn tx(account_keys: &[&str], instructions: Vec<RawInstruction>) -> RawTransaction {
        RawTransaction {
            signature: "sig".to_owned(),
            slot: 1,
            account_keys: account_keys.iter().map(|key| (*key).to_owned()).collect(),
            instructions,
        }
    }

    fn instruction(program_id_index: usize, data: &str) -> RawInstruction {
        RawInstruction {
            program_id_index,
            data: data.to_owned(),
        }
    }

    fn address(value: &str) -> ProgramAddress {
        ProgramAddress::parse(value).expect("test address is valid")
    }

    #[test]
    fn finds_target_index_when_secp_is_present() {
        let tx = tx(&[SECP, OTHER, TARGET], vec![instruction(2, "data")]);
        assert_eq!(
            co_signed_program_index(&tx, &address(SECP), &address(TARGET)),
            Some(2)
        );
    }

    #[test]
    fn missing_secp_suppresses_a_matching_instruction() {
        let tx = tx(&[OTHER, TARGET], vec![instruction(1, "data")]);
        assert_eq!(
            co_signed_program_index(&tx, &address(SECP), &address(TARGET)),
            None
        );
    }

    #[test]
    fn missing_target_yields_no_match() {
        let tx = tx(&[SECP, OTHER], vec![instruction(1, "data")]);
        assert_eq!(
            co_signed_program_index(&tx, &address(SECP), &address(TARGET)),
            None
        );
    }

    #[test]
    fn instructions_filter_by_program_index_in_order() {
        let tx = tx(
            &[SECP, TARGET],
            vec![
                instruction(0, "first"),
                instruction(1, "second"),
                instruction(1, "third"),
            ],
        );

        let matched: Vec<&str> = matching_instructions(&tx, 1)
            .map(|instruction| instruction.data.as_str())
            .collect();
        assert_eq!(matched, vec!["second", "third"]);
    }
}
