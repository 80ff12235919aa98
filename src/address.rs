//! Row address select patterns.
//!
//! The panel's A..E inputs select which pair of rows is driven. Rather than
//! compute GPIO writes at runtime, every row gets a precomputed set/clear pair
//! which the address engine copies into the port's bit set/reset register.

use heapless::Vec;

use crate::error::{Error, Result};

/// Most scan rows a panel can have with five address lines.
pub const MAX_ROWS: usize = 32;

/// Set and clear masks for one row, laid out as a bit set/reset register word.
///
/// On a BSRR style register the low halfword sets pins and the high halfword
/// resets them, so a single 32-bit store drives every address line at once.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressPair {
    pub set: u16,
    pub clear: u16,
}

impl AddressPair {
    /// The 32-bit value written to the bit set/reset register.
    pub fn bsrr(&self) -> u32 {
        u32::from(self.set) | (u32::from(self.clear) << 16)
    }

    /// Apply this pair to the current state of an output data register.
    pub fn apply(&self, odr: u16) -> u16 {
        (odr & !self.clear) | self.set
    }
}

/// Address pairs for every scan row of a panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressTable {
    pairs: Vec<AddressPair, MAX_ROWS>,
    mask: u16,
}

impl AddressTable {
    /// Build the table for `rows` scan rows, where `pins[n]` is the port pin
    /// carrying address bit `n`.
    pub fn new(pins: &[u8], rows: u16) -> Result<Self> {
        if rows == 0 || usize::from(rows) > MAX_ROWS {
            return Err(Error::InvalidRows(rows));
        }

        let mut mask = 0u16;
        for &pin in pins {
            if pin >= 16 || mask & (1 << pin) != 0 {
                return Err(Error::InvalidAddressPin(pin));
            }
            mask |= 1 << pin;
        }

        if pins.len() < 16 && (1usize << pins.len()) < usize::from(rows) {
            return Err(Error::NotEnoughAddressPins { rows, pins: pins.len() });
        }

        let mut pairs = Vec::new();
        for row in 0..rows {
            let mut set = 0u16;
            for (bit, &pin) in pins.iter().enumerate() {
                if row & (1 << bit) != 0 {
                    set |= 1 << pin;
                }
            }
            // Cannot overflow, rows was checked against MAX_ROWS.
            let _ = pairs.push(AddressPair { set, clear: mask & !set });
        }

        Ok(AddressTable { pairs, mask })
    }

    /// Every pin driven by this table.
    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Address pair for `row`, or all-zero if `row` is outside the panel.
    pub fn get(&self, row: usize) -> AddressPair {
        self.pairs.get(row).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_select_each_row() {
        let t = AddressTable::new(&[8, 9, 10, 11], 16).unwrap();
        assert_eq!(t.len(), 16);
        assert_eq!(t.mask(), 0x0F00);
        assert_eq!(t.get(0), AddressPair { set: 0, clear: 0x0F00 });
        assert_eq!(t.get(5), AddressPair { set: 0x0500, clear: 0x0A00 });
        assert_eq!(t.get(15), AddressPair { set: 0x0F00, clear: 0 });
        for row in 0..16 {
            let p = t.get(row);
            assert_eq!(p.set & p.clear, 0);
            assert_eq!(p.set | p.clear, t.mask());
            assert_eq!(p.apply(0xF0FF) & 0x0F00, (row as u16) << 8);
        }
    }

    #[test]
    fn bsrr_word_puts_clear_in_high_half() {
        let p = AddressPair { set: 0x0003, clear: 0x001C };
        assert_eq!(p.bsrr(), 0x001C_0003);
    }

    #[test]
    fn scattered_pins() {
        let t = AddressTable::new(&[0, 7, 3], 8).unwrap();
        assert_eq!(t.get(6), AddressPair { set: 0x0088, clear: 0x0001 });
    }

    #[test]
    fn rejects_bad_pins() {
        assert_eq!(AddressTable::new(&[16], 2), Err(Error::InvalidAddressPin(16)));
        assert_eq!(AddressTable::new(&[1, 1], 4), Err(Error::InvalidAddressPin(1)));
        assert_eq!(
            AddressTable::new(&[1, 2, 3], 16),
            Err(Error::NotEnoughAddressPins { rows: 16, pins: 3 })
        );
        assert_eq!(AddressTable::new(&[1], 0), Err(Error::InvalidRows(0)));
        assert_eq!(AddressTable::new(&[0, 1, 2, 3, 4, 5], 64), Err(Error::InvalidRows(64)));
    }

    #[test]
    fn out_of_range_row_is_zero() {
        let t = AddressTable::new(&[0, 1], 4).unwrap();
        assert_eq!(t.get(4), AddressPair::default());
    }
}
