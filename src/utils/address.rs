//! Deposit addresses for new CryptoPort wallets. They only need to look like
//! the real thing; nothing on-chain ever sees them.

use rand::Rng;

use crate::models::CryptoCurrency;

const BASE58: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const HEX: &[u8] = b"0123456789abcdef";
const BECH32ISH: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_string<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Address for `symbol`. Symbols without a known format get a readable
/// `{sym}-{user}-{account}-{currency}` tag.
pub fn deposit_address(symbol: &str, user_id: i64, account_id: i64, currency_id: i64) -> String {
    let mut rng = rand::thread_rng();
    match CryptoCurrency::from_symbol(symbol) {
        Some(CryptoCurrency::BTC) => format!("1{}", random_string(&mut rng, BASE58, 33)),
        Some(
            CryptoCurrency::ETH | CryptoCurrency::BNB | CryptoCurrency::LINK | CryptoCurrency::UNI,
        ) => format!("0x{}", random_string(&mut rng, HEX, 40)),
        Some(CryptoCurrency::SOL) => random_string(&mut rng, BASE58, 32),
        Some(CryptoCurrency::ADA) => format!("addr1{}", random_string(&mut rng, BECH32ISH, 58)),
        Some(CryptoCurrency::DOT) => random_string(&mut rng, BASE58, 48),
        None => format!(
            "{}-{}-{}-{}",
            symbol.to_lowercase(),
            user_id,
            account_id,
            currency_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_in(s: &str, alphabet: &[u8]) -> bool {
        s.bytes().all(|b| alphabet.contains(&b))
    }

    #[test]
    fn address_shapes() {
        let btc = deposit_address("BTC", 1, 2, 3);
        assert_eq!(btc.len(), 34);
        assert!(btc.starts_with('1'));
        assert!(all_in(&btc, BASE58));

        for sym in ["ETH", "BNB", "LINK", "UNI"] {
            let addr = deposit_address(sym, 1, 2, 3);
            assert_eq!(addr.len(), 42, "{}", sym);
            assert!(addr.starts_with("0x"));
            assert!(all_in(&addr[2..], HEX));
        }

        let sol = deposit_address("sol", 1, 2, 3);
        assert_eq!(sol.len(), 32);
        assert!(all_in(&sol, BASE58));

        let ada = deposit_address("ADA", 1, 2, 3);
        assert_eq!(ada.len(), 63);
        assert!(ada.starts_with("addr1"));
        assert!(all_in(&ada[5..], BECH32ISH));

        let dot = deposit_address("DOT", 1, 2, 3);
        assert_eq!(dot.len(), 48);
        assert!(all_in(&dot, BASE58));

        assert_eq!(deposit_address("DOGE", 7, 8, 9), "doge-7-8-9");
    }

    #[test]
    fn base58_skips_ambiguous_characters() {
        assert_eq!(BASE58.len(), 58);
        for c in [b'0', b'O', b'I', b'l'] {
            assert!(!BASE58.contains(&c));
        }
    }
}
