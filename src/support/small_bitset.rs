//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mailpat.
//
// Mailpat is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailpat is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailpat. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;

/// A bitset optimised for the case where no bits over 63 are required.
///
/// This is internally just an inline `u64` and an `Option<Box<Vec<u64>>>`,
/// so small mailboxes and short thread walks never allocate.
#[derive(Clone, Default)]
pub struct SmallBitset {
    near: u64,
    far: Option<Box<Vec<u64>>>,
}

impl fmt::Debug for SmallBitset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SmallBitset")?;
        f.debug_list().entries(self.iter()).finish()
    }
}

impl SmallBitset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `val` into the bitset.
    ///
    /// Returns true if the element was not already present.
    pub fn insert(&mut self, val: usize) -> bool {
        let (word, mask) = self.addr_mut(val);
        let ret = 0 == (*word & mask);
        *word |= mask;
        ret
    }

    pub fn contains(&self, val: usize) -> bool {
        let (word, mask) = self.addr(val);
        0 != (word & mask)
    }

    /// Remove every element, retaining any out-of-line storage.
    pub fn clear(&mut self) {
        self.near = 0;
        if let Some(ref mut far) = self.far {
            far.iter_mut().for_each(|w| *w = 0);
        }
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item = usize> + 'a {
        let far: &'a [u64] = self.far.as_ref().map_or(&[], |v| &v[..]);
        std::iter::once(self.near)
            .chain(far.iter().copied())
            .enumerate()
            .flat_map(move |(ix, word)| {
                (0..64)
                    .filter(move |&bit| 0 != (word & (1 << bit)))
                    .map(move |bit| bit + ix * 64)
            })
    }

    fn addr_mut(&mut self, val: usize) -> (&mut u64, u64) {
        if val < 64 {
            (&mut self.near, 1 << val)
        } else {
            let ix = val / 64 - 1;
            let far = self.far.get_or_insert_with(|| Box::new(Vec::new()));
            if far.len() <= ix {
                far.resize(ix + 1, 0);
            }

            (&mut far[ix], 1 << (val % 64))
        }
    }

    fn addr(&self, val: usize) -> (u64, u64) {
        if val < 64 {
            (self.near, 1 << val)
        } else if let Some(far) = self.far.as_ref() {
            let ix = val / 64 - 1;
            (far.get(ix).copied().unwrap_or(0), 1 << (val % 64))
        } else {
            (0, 1 << (val % 64))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_operations() {
        let mut bs = SmallBitset::new();
        assert_eq!(0, bs.iter().count());
        assert!(!bs.contains(0));
        assert!(!bs.contains(100));

        assert!(bs.insert(0));
        assert!(bs.insert(42));
        assert!(!bs.insert(42));
        assert!(bs.insert(1000));

        assert!(bs.contains(0));
        assert!(!bs.contains(1));
        assert!(bs.contains(1000));
        assert_eq!(vec![0, 42, 1000], bs.iter().collect::<Vec<_>>());
    }

    #[test]
    fn clear_forgets_everything() {
        let mut bs = SmallBitset::new();
        bs.insert(3);
        bs.insert(300);

        bs.clear();
        assert!(!bs.contains(3));
        assert!(!bs.contains(300));
        assert_eq!(0, bs.iter().count());

        assert!(bs.insert(300));
        assert_eq!(vec![300], bs.iter().collect::<Vec<_>>());
    }
}
