// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    tact = { "contracts/main.tact", Language::Tact },
    fc = { "contracts/jetton.fc", Language::Func },
    func = { "contracts/wallet.func", Language::Func },
    tolk = { "contracts/counter.tolk", Language::Tolk },
    typescript = { "wrappers/Main.ts", Language::TypeScript },
    javascript = { "scripts/deploy.js", Language::JavaScript },
    markdown = { "README.md", Language::Other },
    no_extension = { "Makefile", Language::Other },
)]
fn detects_language(path: &str, expected: Language) {
    assert_eq!(Language::detect(path), expected);
}

#[parameterized(
    tact = { "a.tact", true },
    ts = { "b.ts", true },
    json = { "package.json", true },
    binary = { "contract.bin", false },
    env = { "secrets.env", false },
    hidden_only = { ".gitignore", false },
)]
fn extension_allow_list(path: &str, accepted: bool) {
    assert_eq!(is_accepted_extension(path), accepted);
}

#[parameterized(
    tests_dir = { "tests/counter.spec.ts", true },
    nested_tests_dir = { "contracts/tests/escrow.tact", true },
    dunder = { "src/__tests__/main.ts", true },
    spec_infix = { "wrappers/Main.spec.ts", true },
    plain = { "contracts/main.tact", false },
    test_in_name_only = { "contracts/testnet.tact", false },
)]
fn test_file_detection(path: &str, expected: bool) {
    assert_eq!(is_test_path(path), expected);
}

#[test]
fn contract_languages() {
    assert!(Language::Tact.is_contract_language());
    assert!(Language::Func.is_contract_language());
    assert!(Language::Tolk.is_contract_language());
    assert!(!Language::TypeScript.is_contract_language());
    assert!(!Language::Other.is_contract_language());
}
