// quill-vm - Property-based tests for the instruction codec and symbol table
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests for the bytecode layer:
//! - encode/decode round-trip for every operand layout
//! - disassembly offsets are monotonic and exactly cover the stream
//! - symbol indices are dense and monotonic within a scope
//! - resolution from an inner scope never yields an outer local

use proptest::prelude::*;

use quill_vm::code::{self, Instructions, Opcode};
use quill_vm::{SymbolScope, SymbolTable};

// =============================================================================
// Strategies
// =============================================================================

/// An encoded instruction together with its expected byte length.
fn arb_instruction() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(code::make(Opcode::Add, &[])),
        Just(code::make(Opcode::Pop, &[])),
        Just(code::make(Opcode::Nil, &[])),
        Just(code::make(Opcode::ReturnValue, &[])),
        any::<u16>().prop_map(|n| code::make(Opcode::Constant, &[n as usize])),
        any::<u16>().prop_map(|n| code::make(Opcode::Jump, &[n as usize])),
        any::<u16>().prop_map(|n| code::make(Opcode::SetGlobal, &[n as usize])),
        any::<u8>().prop_map(|n| code::make(Opcode::GetLocal, &[n as usize])),
        any::<u8>().prop_map(|n| code::make(Opcode::Call, &[n as usize])),
        (any::<u16>(), any::<u8>())
            .prop_map(|(c, n)| code::make(Opcode::Closure, &[c as usize, n as usize])),
    ]
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

// =============================================================================
// Codec round-trip
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// `read_operands` inverts `make` for two-byte operands.
    #[test]
    fn roundtrip_u16_operand(value in any::<u16>()) {
        for op in [Opcode::Constant, Opcode::Jump, Opcode::JumpNotTrue, Opcode::Array] {
            let encoded = code::make(op, &[value as usize]);
            prop_assert_eq!(encoded.len(), 3);
            let def = code::lookup(op as u8).unwrap();
            let (operands, read) = code::read_operands(def, &encoded[1..]);
            prop_assert_eq!(read, 2);
            prop_assert_eq!(&operands, &vec![value as usize]);
        }
    }

    /// `read_operands` inverts `make` for one-byte operands.
    #[test]
    fn roundtrip_u8_operand(value in any::<u8>()) {
        for op in [Opcode::Call, Opcode::GetLocal, Opcode::Context, Opcode::GetBuiltin] {
            let encoded = code::make(op, &[value as usize]);
            prop_assert_eq!(encoded.len(), 2);
            let def = code::lookup(op as u8).unwrap();
            let (operands, read) = code::read_operands(def, &encoded[1..]);
            prop_assert_eq!(read, 1);
            prop_assert_eq!(&operands, &vec![value as usize]);
        }
    }

    /// Mixed-width operands round-trip too.
    #[test]
    fn roundtrip_closure_operands(const_index in any::<u16>(), captures in any::<u8>()) {
        let encoded = code::make(
            Opcode::Closure,
            &[const_index as usize, captures as usize],
        );
        prop_assert_eq!(encoded.len(), 4);
        let def = code::lookup(Opcode::Closure as u8).unwrap();
        let (operands, read) = code::read_operands(def, &encoded[1..]);
        prop_assert_eq!(read, 3);
        prop_assert_eq!(&operands, &vec![const_index as usize, captures as usize]);
    }

    /// Width-1 operands are truncated to the low byte.
    #[test]
    fn u8_operand_truncates(value in 256usize..=usize::from(u16::MAX)) {
        let encoded = code::make(Opcode::GetLocal, &[value]);
        prop_assert_eq!(encoded[1], value as u8);
    }
}

// =============================================================================
// Disassembly coverage
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Disassembly offsets are strictly increasing, start at zero, and
    /// exactly cover the byte range of the stream.
    #[test]
    fn disassembly_offsets_cover_stream(parts in prop::collection::vec(arb_instruction(), 0..40)) {
        let mut stream = Instructions::new();
        let mut expected_offsets = Vec::new();
        let mut offset = 0;
        for part in &parts {
            expected_offsets.push(offset);
            offset += part.len();
            stream.append(part);
        }

        let printed = stream.to_string();
        let offsets: Vec<usize> = printed
            .lines()
            .map(|line| {
                line.split_whitespace()
                    .next()
                    .expect("offset column")
                    .parse()
                    .expect("numeric offset")
            })
            .collect();

        prop_assert_eq!(&offsets, &expected_offsets);
        for pair in offsets.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        prop_assert_eq!(offset, stream.len());
    }
}

// =============================================================================
// Symbol table invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Successive definitions in one scope get dense, increasing indices.
    #[test]
    fn define_indices_are_monotonic(names in prop::collection::vec(arb_name(), 1..20)) {
        let mut table = SymbolTable::new();
        for (i, name) in names.iter().enumerate() {
            let symbol = table.define(name);
            prop_assert_eq!(symbol.index, i);
            prop_assert_eq!(symbol.scope, SymbolScope::Global);
        }
    }

    /// Resolution from an inner scope never returns a local belonging to
    /// an outer scope: outer locals always surface as context captures.
    #[test]
    fn resolve_never_returns_outer_local(
        globals in prop::collection::vec(arb_name(), 0..5),
        locals in prop::collection::vec(arb_name(), 1..5),
        depth in 1usize..4,
    ) {
        let mut table = SymbolTable::new();
        for name in &globals {
            table.define(name);
        }
        table.push_scope();
        for name in &locals {
            table.define(name);
        }
        for _ in 0..depth {
            table.push_scope();
        }

        for name in globals.iter().chain(&locals) {
            let symbol = table.resolve(name).expect("defined name resolves");
            prop_assert_ne!(
                symbol.scope,
                SymbolScope::Local,
                "{} resolved to an outer local",
                name
            );
            prop_assert!(matches!(
                symbol.scope,
                SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Context
            ));
        }
    }
}
