//! 属性测试: HD derivation invariants over random indices and seeds.

use proptest::prelude::*;
use secure_keyring::keyring::derivation::{derive_keypair, highest_indices};
use secure_keyring::keyring::{
    indexed_path, DerivationPath, HdKeyringFactory, HdKeyringInit, Keyring, KeyringFactory,
};
use zeroize::Zeroizing;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn keyring() -> secure_keyring::keyring::HdKeyring {
    HdKeyringFactory
        .init(HdKeyringInit::new(Zeroizing::new(MNEMONIC.to_string())))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_derivation_is_deterministic(seed in prop::collection::vec(any::<u8>(), 16..=64), account in 0u32..1000, wallet in 0u32..1000) {
        let path = DerivationPath::indexed(account, wallet);
        let a = derive_keypair(&seed, &path).unwrap();
        let b = derive_keypair(&seed, &path).unwrap();
        prop_assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn prop_distinct_wallets_distinct_keys(seed in prop::collection::vec(any::<u8>(), 32), wallet in 0u32..1000) {
        let a = derive_keypair(&seed, &DerivationPath::indexed(0, wallet)).unwrap();
        let b = derive_keypair(&seed, &DerivationPath::indexed(0, wallet + 1)).unwrap();
        prop_assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn prop_path_text_round_trips(account in 0u32..0x8000_0000, wallet in 0u32..0x8000_0000) {
        let text = indexed_path(account, wallet);
        let parsed: DerivationPath = text.parse().unwrap();
        prop_assert_eq!(parsed.account_index(), Some(account));
        prop_assert_eq!(parsed.wallet_index(), Some(wallet));
        prop_assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn prop_add_path_is_idempotent(account in 0u32..20, wallet in 0u32..20) {
        let mut kr = keyring();
        let path = indexed_path(account, wallet);
        let first = kr.add_derivation_path(&path).unwrap();
        let count = kr.public_keys().len();
        let second = kr.add_derivation_path(&path).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(kr.public_keys().len(), count);
    }

    #[test]
    fn prop_highest_indices_is_max_pair(pairs in prop::collection::vec((0u32..50, 0u32..50), 1..8)) {
        let paths: Vec<String> = pairs.iter().map(|(a, w)| indexed_path(*a, *w)).collect();
        let expected = pairs.iter().copied().max().unwrap();
        prop_assert_eq!(highest_indices(paths.iter().map(String::as_str)), expected);
    }

    #[test]
    fn prop_next_path_is_unused(extra in prop::collection::vec(0u32..6, 0..6)) {
        let mut kr = keyring();
        for w in &extra {
            kr.add_derivation_path(&indexed_path(0, *w)).unwrap();
        }
        let derived = kr.derive_next_key().unwrap();
        let occurrences = kr
            .derivation_paths()
            .iter()
            .filter(|p| **p == derived.derivation_path)
            .count();
        prop_assert_eq!(occurrences, 1);
    }
}
