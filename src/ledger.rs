//! The append-only ledger convention shared by every domain.
//!
//! Any operation that moves value records paired entries whose signed amounts
//! are exact negatives. Reversals (refunds, transfer reversals) append
//! mirrored entries; nothing is ever removed or rewritten.

use crate::error::ToolError;
use crate::money::Money;

/// A signed monetary record tied to one economic event.
pub trait LedgerEntry {
    /// Key of the economic event this entry belongs to.
    fn event_key(&self) -> String;

    /// Signed amount; outbound or charge entries are negative for the payer.
    fn signed_amount(&self) -> Money;
}

/// An entry that can be cancelled by appending its mirror image.
pub trait Reversible: LedgerEntry + Sized {
    /// The entry that nets this one to zero.
    fn reversal(&self) -> Self;
}

/// Signed sum of the given entries.
pub fn net<'a, E, I>(entries: I) -> Money
where
    E: LedgerEntry + 'a,
    I: IntoIterator<Item = &'a E>,
{
    entries.into_iter().map(LedgerEntry::signed_amount).sum()
}

/// Fails with [`ToolError::LedgerImbalance`] unless the entries net to zero.
pub fn ensure_balanced<'a, E, I>(event: &str, entries: I) -> Result<(), ToolError>
where
    E: LedgerEntry + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let total = net(entries);
    if total.is_zero() {
        Ok(())
    } else {
        Err(ToolError::LedgerImbalance {
            event: event.to_string(),
            net: total,
        })
    }
}

/// Mirror entries for every original, in the same order.
pub fn reversals<E: Reversible>(originals: &[E]) -> Vec<E> {
    originals.iter().map(Reversible::reversal).collect()
}

/// Returns true if `reversed` holds exactly one `-A` for every `A` in `originals`.
pub fn is_mirror<'a, E, I, J>(originals: I, reversed: J) -> bool
where
    E: LedgerEntry + 'a,
    I: IntoIterator<Item = &'a E>,
    J: IntoIterator<Item = &'a E>,
{
    let mut expected: Vec<i64> = originals
        .into_iter()
        .map(|e| (-e.signed_amount()).minor())
        .collect();
    let mut actual: Vec<i64> = reversed.into_iter().map(|e| e.signed_amount().minor()).collect();
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        event: &'static str,
        amount: Money,
    }

    impl LedgerEntry for Entry {
        fn event_key(&self) -> String {
            self.event.to_string()
        }

        fn signed_amount(&self) -> Money {
            self.amount
        }
    }

    impl Reversible for Entry {
        fn reversal(&self) -> Self {
            Self {
                event: self.event,
                amount: -self.amount,
            }
        }
    }

    fn entry(amount: i64) -> Entry {
        Entry {
            event: "e1",
            amount: Money::from_minor(amount),
        }
    }

    #[test]
    fn paired_entries_balance() {
        let entries = [entry(-10_000), entry(10_000)];
        assert!(ensure_balanced("e1", &entries).is_ok());
    }

    #[test]
    fn unpaired_entries_are_rejected() {
        let entries = [entry(-10_000), entry(9_999)];
        let err = ensure_balanced("e1", &entries).unwrap_err();
        assert_eq!(err.code(), "ledger_imbalance");
    }

    #[test]
    fn reversals_mirror_originals() {
        let originals = vec![entry(25_000), entry(1_250)];
        let mirrored = reversals(&originals);
        assert!(is_mirror(&originals, &mirrored));
        assert!(net(originals.iter().chain(mirrored.iter())).is_zero());
        assert!(!is_mirror(&originals, &originals));
    }
}
