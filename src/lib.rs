// Copyright 2012-2014 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// (1) Be careful, most things can overflow here because the amount of bits in
//     memory can overflow `usize`.
// (2) Make sure that the underlying vector has no excess length:
//     E. g. `nbits == 16`, `storage.len() == 2` would be excess length,
//     because the last word isn't used at all. This is important because some
//     methods rely on it (for *CORRECTNESS*).
// (3) Make sure that the unused bits in the last word are zeroed out. Equality
//     and hashing mask the last word anyway, but `to_bytes` and the population
//     count in (4) rely on it.
// (4) `ones` is the number of set bits in `0..nbits`. Single-bit writes must
//     go through `set`, which is the only place that adjusts it. Constructors
//     that build whole words at once compute it directly.

//! A growable vector of bits, packed into machine words, that keeps a running
//! count of its set bits.
//!
//! Bits are addressed from index `0` upwards. Bytes and binary-digit strings
//! map to bits most significant bit first, which makes the vector a
//! convenient carrier for fixed-width groups such as the 11-bit word indices
//! of a mnemonic phrase.
//!
//! # Examples
//!
//! ```
//! use bit_vector::BitVector;
//!
//! let groups = [1234u16, 7, 2047];
//!
//! // Encode each group as 11 binary digits and concatenate them.
//! let digits: String = groups.iter().map(|g| format!("{:011b}", g)).collect();
//! let bits: BitVector = BitVector::from_binary_str(&digits).unwrap();
//! assert_eq!(bits.len(), 33);
//!
//! // Decode by slicing the vector into 11-bit windows.
//! let decoded: Vec<u16> = (0..groups.len())
//!     .map(|i| {
//!         bits.slice(i * 11..(i + 1) * 11)
//!             .iter()
//!             .fold(0, |acc, bit| (acc << 1) | bit as u16)
//!     })
//!     .collect();
//! assert_eq!(decoded, groups);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash;
use core::iter::{self, repeat, FusedIterator};
use core::ops::{BitAnd, BitOr, Bound, Index, Not, RangeBounds, Shl, Shr, Sub};
use core::str::FromStr;

use thiserror::Error;

/// Abstracts over a pile of bits (basically unsigned primitives)
pub trait BitBlock:
    Copy
    + Sub<Self, Output = Self>
    + Shl<usize, Output = Self>
    + Shr<usize, Output = Self>
    + Not<Output = Self>
    + BitAnd<Self, Output = Self>
    + BitOr<Self, Output = Self>
    + Eq
    + hash::Hash
{
    /// How many bits it has
    fn bits() -> usize;
    /// How many bytes it has
    fn bytes() -> usize {
        Self::bits() / 8
    }
    /// Convert a byte into this type (lowest-order bits set)
    fn from_byte(byte: u8) -> Self;
    /// The lowest-order byte of this block
    fn low_byte(self) -> u8;
    /// Count the number of 1's in the bitwise repr
    fn count_ones(self) -> usize;
    /// Get `0`
    fn zero() -> Self;
    /// Get `1`
    fn one() -> Self;
}

macro_rules! bit_block_impl {
    ($($t: ty),*) => ($(
        impl BitBlock for $t {
            #[inline]
            fn bits() -> usize { <$t>::BITS as usize }
            #[inline]
            fn from_byte(byte: u8) -> Self { byte as $t }
            #[inline]
            fn low_byte(self) -> u8 { self as u8 }
            #[inline]
            fn count_ones(self) -> usize { self.count_ones() as usize }
            #[inline]
            fn one() -> Self { 1 }
            #[inline]
            fn zero() -> Self { 0 }
        }
    )*)
}

bit_block_impl! { u8, u16, u32, u64, usize }

static TRUE: bool = true;
static FALSE: bool = false;

/// Error returned when parsing a [`BitVector`] from a string that contains
/// something other than `'0'` and `'1'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid binary digit {found:?} at position {index}")]
pub struct ParseBitVectorError {
    /// Character position of the offending character.
    pub index: usize,
    /// The offending character.
    pub found: char,
}

/// The bitvector type.
///
/// # Examples
///
/// ```
/// use bit_vector::BitVector;
///
/// let mut bv: BitVector = BitVector::from_elem(10, false);
///
/// // insert all primes less than 10
/// bv.set(2, true);
/// bv.set(3, true);
/// bv.set(5, true);
/// bv.set(7, true);
/// assert_eq!(bv.to_binary_string(), "0011010100");
/// assert_eq!(bv.count_ones(), 4);
///
/// // squeeze in a bit and take one out again
/// bv.insert(0, true);
/// assert_eq!(bv.remove(3), true);
/// assert_eq!(bv.to_binary_string(), "1001010100");
///
/// // reset bitvector to empty
/// bv.clear();
/// assert!(bv.is_empty());
/// assert_eq!(bv.count_ones(), 0);
/// ```
pub struct BitVector<B = usize> {
    /// Internal representation of the bit vector
    storage: Vec<B>,
    /// The number of valid bits in the internal representation
    nbits: usize,
    /// The number of set bits in the valid range
    ones: usize,
}

impl<B: BitBlock> Index<usize> for BitVector<B> {
    type Output = bool;

    #[inline]
    fn index(&self, i: usize) -> &bool {
        match self.get(i) {
            Some(true) => &TRUE,
            Some(false) => &FALSE,
            None => panic!(
                "index out of bounds: the len is {} but the index is {}",
                self.nbits, i
            ),
        }
    }
}

/// Computes how many blocks are needed to store that many bits
fn blocks_for_bits<B: BitBlock>(bits: usize) -> usize {
    // If we want 17 bits, dividing by 32 will produce 0. So we add 1 to make sure we
    // reserve enough. But if we want exactly a multiple of 32, this will actually allocate
    // one too many. So we need to check if that's the case.
    //
    // Note that we can technically avoid this branch with the expression
    // `(nbits + B::bits() - 1) / B::bits()`, but if nbits is almost usize::MAX this will
    // overflow.
    if bits % B::bits() == 0 {
        bits / B::bits()
    } else {
        bits / B::bits() + 1
    }
}

/// Computes the bitmask for the final word of the vector
fn mask_for_bits<B: BitBlock>(bits: usize) -> B {
    // Note especially that a perfect multiple of B::bits() should mask all 1s.
    !B::zero() >> ((B::bits() - bits % B::bits()) % B::bits())
}

impl<B: BitBlock> BitVector<B> {
    /// An operation might screw up the unused bits in the last block of the
    /// `BitVector`. As per (3), it's assumed to be all 0s. This method fixes it up.
    fn fix_last_block(&mut self) {
        let extra_bits = self.nbits % B::bits();
        if extra_bits > 0 {
            let mask = (B::one() << extra_bits) - B::one();
            if let Some(block) = self.storage.last_mut() {
                *block = *block & mask;
            }
        }
    }

    /// The storage words with the unused bits of the last one masked off.
    fn logical_blocks(&self) -> impl Iterator<Item = B> + '_ {
        let last = self.storage.len().wrapping_sub(1);
        let mask = mask_for_bits::<B>(self.nbits);
        self.storage
            .iter()
            .enumerate()
            .map(move |(i, &block)| if i == last { block & mask } else { block })
    }

    /// Reads bit `i` without checking it against `nbits`.
    #[inline]
    fn bit(&self, i: usize) -> bool {
        let block = self.storage[i / B::bits()];
        (block & (B::one() << (i % B::bits()))) != B::zero()
    }

    /// Resolves `range` against `0..=nbits`, panicking if it falls outside.
    fn resolve_range<R: RangeBounds<usize>>(&self, range: R) -> (usize, usize) {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.checked_add(1).expect("range start overflows usize"),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n.checked_add(1).expect("range end overflows usize"),
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.nbits,
        };
        assert!(
            start <= end,
            "range start index {} is greater than end index {}",
            start,
            end
        );
        assert!(
            end <= self.nbits,
            "range end index {} out of range for length {}",
            end,
            self.nbits
        );
        (start, end)
    }

    /// Creates an empty `BitVector`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    /// let bv: BitVector = BitVector::new();
    /// assert!(bv.is_empty());
    /// ```
    pub fn new() -> Self {
        BitVector {
            storage: Vec::new(),
            nbits: 0,
            ones: 0,
        }
    }

    /// Creates a `BitVector` that holds `nbits` elements, setting each element
    /// to `bit`.
    ///
    /// Whole words are filled at once, so this is the same as pushing `bit`
    /// `nbits` times, only cheaper.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_elem(10, true);
    /// assert_eq!(bv.len(), 10);
    /// assert_eq!(bv.count_ones(), 10);
    /// for x in bv.iter() {
    ///     assert_eq!(x, true);
    /// }
    /// ```
    pub fn from_elem(nbits: usize, bit: bool) -> Self {
        let nblocks = blocks_for_bits::<B>(nbits);
        let mut bit_vec = BitVector {
            storage: repeat(if bit { !B::zero() } else { B::zero() })
                .take(nblocks)
                .collect(),
            nbits,
            ones: if bit { nbits } else { 0 },
        };
        bit_vec.fix_last_block();
        bit_vec
    }

    /// Constructs a new, empty `BitVector` with the specified capacity.
    ///
    /// The bitvector will be able to hold at least `capacity` bits without
    /// reallocating. If `capacity` is 0, it will not allocate.
    ///
    /// It is important to note that this function does not specify the
    /// *length* of the returned bitvector, but only the *capacity*.
    pub fn with_capacity(nbits: usize) -> Self {
        BitVector {
            storage: Vec::with_capacity(blocks_for_bits::<B>(nbits)),
            nbits: 0,
            ones: 0,
        }
    }

    /// Transforms a byte-vector into a `BitVector`. Each byte becomes eight bits,
    /// with the most significant bits of each byte coming first. Each
    /// bit becomes `true` if equal to 1 or `false` if equal to 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_bytes(&[0b10100000, 0b00010010]);
    /// assert!(bv.eq_vec(&[true, false, true, false,
    ///                     false, false, false, false,
    ///                     false, false, false, true,
    ///                     false, false, true, false]));
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().checked_mul(8).expect("capacity overflow");
        let mut bit_vec = BitVector::with_capacity(len);

        for chunk in bytes.chunks(B::bytes()) {
            let mut block = B::zero();
            for (i, &byte) in chunk.iter().enumerate() {
                block = block | (B::from_byte(byte.reverse_bits()) << (i * 8));
            }
            bit_vec.ones += block.count_ones();
            bit_vec.storage.push(block);
        }
        bit_vec.nbits = len;

        bit_vec
    }

    /// Collects a slice of `bool`s into a `BitVector`.
    pub fn from_bools(bits: &[bool]) -> Self {
        bits.iter().copied().collect()
    }

    /// Builds a `BitVector` from integer flags, where any non-zero value is a
    /// set bit.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_flags([0u8, 3, 0, 255]);
    /// assert_eq!(bv.to_binary_string(), "0101");
    /// ```
    pub fn from_flags<I, T>(flags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: PartialEq + Default,
    {
        let zero = T::default();
        flags.into_iter().map(|flag| flag != zero).collect()
    }

    /// Parses a string of `'0'` and `'1'` characters, returning `None` if any
    /// other character is present.
    ///
    /// Use [`str::parse`] instead to find out which character was rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_binary_str("10110").unwrap();
    /// assert_eq!(bv.len(), 5);
    /// assert_eq!(bv.count_ones(), 3);
    /// assert_eq!(bv.to_bytes(), [0b10110000]);
    ///
    /// assert!(BitVector::<usize>::from_binary_str("10210").is_none());
    /// ```
    pub fn from_binary_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Retrieves the value at index `i`, or `None` if the index is out of bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_bytes(&[0b01100000]);
    /// assert_eq!(bv.get(0), Some(false));
    /// assert_eq!(bv.get(1), Some(true));
    /// assert_eq!(bv.get(100), None);
    ///
    /// // Can also use array indexing
    /// assert_eq!(bv[1], true);
    /// ```
    #[inline]
    pub fn get(&self, i: usize) -> Option<bool> {
        if i >= self.nbits {
            return None;
        }
        Some(self.bit(i))
    }

    /// Sets the value of a bit at an index `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(5, false);
    /// bv.set(3, true);
    /// assert_eq!(bv[3], true);
    /// assert_eq!(bv.count_ones(), 1);
    /// ```
    #[inline]
    pub fn set(&mut self, i: usize, x: bool) {
        assert!(
            i < self.nbits,
            "index out of bounds: the len is {} but the index is {}",
            self.nbits,
            i
        );
        let w = i / B::bits();
        let flag = B::one() << (i % B::bits());
        let block = self.storage[w];
        if ((block & flag) != B::zero()) == x {
            return;
        }
        // (4)
        if x {
            self.storage[w] = block | flag;
            self.ones += 1;
        } else {
            self.storage[w] = block & !flag;
            self.ones -= 1;
        }
    }

    /// Returns the number of bits set to `true`.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.ones
    }

    /// Returns the number of bits set to `false`.
    #[inline]
    pub fn count_zeros(&self) -> usize {
        self.nbits - self.ones
    }

    /// Returns `true` if all bits are 1. An empty vector counts as all 1s.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(5, true);
    /// assert_eq!(bv.all(), true);
    ///
    /// bv.set(1, false);
    /// assert_eq!(bv.all(), false);
    /// ```
    #[inline]
    pub fn all(&self) -> bool {
        self.ones == self.nbits
    }

    /// Returns `true` if all bits are 0.
    #[inline]
    pub fn none(&self) -> bool {
        self.ones == 0
    }

    /// Returns `true` if any bit is 1.
    #[inline]
    pub fn any(&self) -> bool {
        !self.none()
    }

    /// Returns an iterator over the elements of the vector in order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_bytes(&[0b01110100, 0b10010010]);
    /// assert_eq!(bv.iter().filter(|x| *x).count(), 7);
    /// ```
    #[inline]
    pub fn iter(&self) -> Iter<'_, B> {
        Iter {
            bit_vec: self,
            next_idx: 0,
            end_idx: self.nbits,
        }
    }

    /// Returns an iterator over the bits in `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range is decreasing or ends past `len()`.
    pub fn iter_range<R: RangeBounds<usize>>(&self, range: R) -> Iter<'_, B> {
        let (start, end) = self.resolve_range(range);
        Iter {
            bit_vec: self,
            next_idx: start,
            end_idx: end,
        }
    }

    /// Copies the bits in `range` into a new `BitVector`.
    ///
    /// # Panics
    ///
    /// Panics if the range is decreasing or ends past `len()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = "1101001".parse().unwrap();
    /// assert_eq!(bv.slice(2..5).to_binary_string(), "010");
    /// assert_eq!(bv.slice(5..).to_binary_string(), "01");
    /// ```
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Self {
        self.iter_range(range).collect()
    }

    /// Organises the bits into bytes, such that the first bit in the
    /// `BitVector` becomes the high-order bit of the first byte. If the
    /// size of the `BitVector` is not a multiple of eight then trailing bits
    /// will be filled-in with `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(3, true);
    /// bv.set(1, false);
    ///
    /// assert_eq!(bv.to_bytes(), [0b10100000]);
    ///
    /// let mut bv: BitVector = BitVector::from_elem(9, false);
    /// bv.set(2, true);
    /// bv.set(8, true);
    ///
    /// assert_eq!(bv.to_bytes(), [0b00100000, 0b10000000]);
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.nbits / 8 + if self.nbits % 8 == 0 { 0 } else { 1 };
        let mut bytes: Vec<u8> = (0..len)
            .map(|i| {
                let offset = i * 8;
                let block = self.storage[offset / B::bits()];
                (block >> (offset % B::bits())).low_byte().reverse_bits()
            })
            .collect();
        let extra_bits = self.nbits % 8;
        if extra_bits > 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xFF << (8 - extra_bits);
            }
        }
        bytes
    }

    /// Same as [`to_bytes`](Self::to_bytes), as an owned byte buffer.
    pub fn into_boxed_bytes(self) -> Box<[u8]> {
        self.to_bytes().into_boxed_slice()
    }

    /// Returns the bits as a `Vec<bool>`.
    pub fn to_bools(&self) -> Vec<bool> {
        self.iter().collect()
    }

    /// Renders the bits as `'0'` and `'1'` characters, first bit first.
    ///
    /// This is the same text `Display` produces and `FromStr` accepts.
    pub fn to_binary_string(&self) -> String {
        self.iter().map(|bit| if bit { '1' } else { '0' }).collect()
    }

    /// Compares a `BitVector` to a slice of `bool`s.
    /// Both the `BitVector` and slice must have the same length.
    ///
    /// # Panics
    ///
    /// Panics if the `BitVector` and slice are of different length.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let bv: BitVector = BitVector::from_bytes(&[0b10100000]);
    ///
    /// assert!(bv.eq_vec(&[true, false, true, false,
    ///                     false, false, false, false]));
    /// ```
    pub fn eq_vec(&self, v: &[bool]) -> bool {
        assert_eq!(self.nbits, v.len());
        self.iter().eq(v.iter().copied())
    }

    /// Shortens a `BitVector`, dropping excess elements.
    ///
    /// If `len` is greater than the vector's current length, this has no
    /// effect.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_bytes(&[0b01001011]);
    /// bv.truncate(2);
    /// assert!(bv.eq_vec(&[false, true]));
    /// assert_eq!(bv.count_ones(), 1);
    /// ```
    pub fn truncate(&mut self, len: usize) {
        if len < self.nbits {
            // (3) and (4)
            for i in len..self.nbits {
                self.set(i, false);
            }
            self.nbits = len;
            // (2)
            self.storage.truncate(blocks_for_bits::<B>(len));
        }
    }

    /// Reserves capacity for at least `additional` more bits to be inserted in the given
    /// `BitVector`. The collection may reserve more space to avoid frequent reallocations.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity overflows `usize`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(3, false);
    /// bv.reserve(10);
    /// assert_eq!(bv.len(), 3);
    /// assert!(bv.capacity() >= 13);
    /// ```
    pub fn reserve(&mut self, additional: usize) {
        let desired_cap = self
            .len()
            .checked_add(additional)
            .expect("capacity overflow");
        self.reserve_capacity(desired_cap);
    }

    /// Makes sure the vector can hold `bits` bits in total without
    /// reallocating. Length and contents are left alone.
    pub fn reserve_capacity(&mut self, bits: usize) {
        if bits > self.capacity() {
            let storage_len = self.storage.len();
            let blocks = blocks_for_bits::<B>(bits);
            log::trace!("reserving {} blocks for {} bits", blocks, bits);
            self.storage.reserve(blocks - storage_len);
        }
    }

    /// Returns the capacity in bits for this bit vector. Inserting any
    /// element less than this amount will not trigger a resizing.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::new();
    /// bv.reserve(10);
    /// assert!(bv.capacity() >= 10);
    /// ```
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage
            .capacity()
            .checked_mul(B::bits())
            .unwrap_or(usize::MAX)
    }

    /// Grows the `BitVector` in-place, adding `n` copies of `value` to the `BitVector`.
    ///
    /// # Panics
    ///
    /// Panics if the new len overflows a `usize`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_bytes(&[0b01001011]);
    /// bv.grow(2, true);
    /// assert_eq!(bv.len(), 10);
    /// assert_eq!(bv.to_bytes(), [0b01001011, 0b11000000]);
    /// ```
    pub fn grow(&mut self, n: usize, value: bool) {
        // Note: we just bulk set all the bits in the last word in this fn in multiple places
        // which is technically wrong if not all of these bits are to be used. However, at the end
        // of this fn we call `fix_last_block` at the end of this fn, which should fix this.

        let new_nbits = self.nbits.checked_add(n).expect("capacity overflow");
        let new_nblocks = blocks_for_bits::<B>(new_nbits);
        let full_value = if value { !B::zero() } else { B::zero() };

        // Correct the old tail word, setting formerly unused bits. They are
        // already zero by (3), so there is nothing to do for `false`.
        if value && self.nbits % B::bits() > 0 {
            let mask = mask_for_bits::<B>(self.nbits);
            if let Some(block) = self.storage.last_mut() {
                *block = *block | !mask;
            }
        }

        // Allocate new words, if needed
        let to_add = new_nblocks - self.storage.len();
        self.storage.extend(repeat(full_value).take(to_add));

        self.nbits = new_nbits;
        if value {
            self.ones += n;
        }

        self.fix_last_block();
    }

    /// Removes the last bit from the BitVector, and returns it. Returns None if the BitVector is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_bytes(&[0b01001001]);
    /// assert_eq!(bv.pop(), Some(true));
    /// assert_eq!(bv.pop(), Some(false));
    /// assert_eq!(bv.len(), 6);
    /// ```
    pub fn pop(&mut self) -> Option<bool> {
        if self.is_empty() {
            None
        } else {
            let i = self.nbits - 1;
            let ret = self.bit(i);
            // (3)
            self.set(i, false);
            self.nbits = i;
            if self.nbits % B::bits() == 0 {
                // (2)
                self.storage.pop();
            }
            Some(ret)
        }
    }

    /// Pushes a `bool` onto the end.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::new();
    /// bv.push(true);
    /// bv.push(false);
    /// assert!(bv.eq_vec(&[true, false]));
    /// ```
    pub fn push(&mut self, elem: bool) {
        if self.nbits % B::bits() == 0 {
            self.storage.push(B::zero());
        }
        let insert_pos = self.nbits;
        self.nbits = self.nbits.checked_add(1).expect("capacity overflow");
        self.set(insert_pos, elem);
    }

    /// Inserts `bit` at position `index`, shifting all bits after it towards
    /// the end.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = "101".parse().unwrap();
    /// bv.insert(1, true);
    /// assert_eq!(bv.to_binary_string(), "1101");
    /// bv.insert(4, false);
    /// assert_eq!(bv.to_binary_string(), "11010");
    /// ```
    pub fn insert(&mut self, index: usize, bit: bool) {
        assert!(
            index <= self.nbits,
            "insertion index (is {}) should be <= len (is {})",
            index,
            self.nbits
        );
        self.splice_exact(index, index, iter::once(bit));
    }

    /// Removes and returns the bit at position `index`, shifting all bits
    /// after it towards the front.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(3, true);
    /// assert_eq!(bv.remove(1), true);
    /// assert_eq!(bv.to_binary_string(), "11");
    /// assert_eq!(bv.count_ones(), 2);
    /// ```
    pub fn remove(&mut self, index: usize) -> bool {
        assert!(
            index < self.nbits,
            "index out of bounds: the len is {} but the index is {}",
            self.nbits,
            index
        );
        let bit = self.bit(index);
        self.splice_exact(index, index + 1, iter::empty());
        bit
    }

    /// Removes and returns the first bit.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn remove_first(&mut self) -> bool {
        assert!(!self.is_empty(), "cannot remove the first bit of an empty BitVector");
        self.remove(0)
    }

    /// Removes and returns the last bit. See [`pop`](Self::pop) for the
    /// non-panicking version.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn remove_last(&mut self) -> bool {
        match self.pop() {
            Some(bit) => bit,
            None => panic!("cannot remove the last bit of an empty BitVector"),
        }
    }

    /// Replaces the bits in `range` with the bits yielded by `replace_with`.
    ///
    /// The range and the replacement may have different lengths; the bits
    /// after the range move to make room or close the gap. Those bits are
    /// shifted in place, back to front when the vector grows and front to
    /// back when it shrinks, so nothing is read after it has been
    /// overwritten.
    ///
    /// # Panics
    ///
    /// Panics if the range is decreasing or ends past `len()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = "11011".parse().unwrap();
    /// bv.replace_range(1..3, [false, false, false]);
    /// assert_eq!(bv.to_binary_string(), "100011");
    /// assert_eq!(bv.count_ones(), 3);
    ///
    /// bv.replace_range(..4, []);
    /// assert_eq!(bv.to_binary_string(), "11");
    /// ```
    pub fn replace_range<R, I>(&mut self, range: R, replace_with: I)
    where
        R: RangeBounds<usize>,
        I: IntoIterator<Item = bool>,
    {
        let (start, end) = self.resolve_range(range);
        let replace_with: Vec<bool> = replace_with.into_iter().collect();
        self.splice_exact(start, end, replace_with.into_iter());
    }

    /// Replaces `start..end`, which must already be validated, with
    /// `replace_with`.
    fn splice_exact<I>(&mut self, start: usize, end: usize, replace_with: I)
    where
        I: ExactSizeIterator<Item = bool>,
    {
        let old_len = self.nbits;
        let removed = end - start;
        let inserted = replace_with.len();
        log::trace!(
            "replacing bits {}..{} of {} with {} bits",
            start,
            end,
            old_len,
            inserted
        );

        if inserted > removed {
            let delta = inserted - removed;
            self.grow(delta, false);
            for i in (end..old_len).rev() {
                let bit = self.bit(i);
                self.set(i + delta, bit);
            }
        } else if removed > inserted {
            let delta = removed - inserted;
            for i in end..old_len {
                let bit = self.bit(i);
                self.set(i - delta, bit);
            }
            self.truncate(old_len - delta);
        }

        for (offset, bit) in replace_with.enumerate() {
            self.set(start + offset, bit);
        }
    }

    /// Removes every bit. With `keep_capacity` the allocation is kept for
    /// reuse, otherwise it is released.
    ///
    /// # Examples
    ///
    /// ```
    /// use bit_vector::BitVector;
    ///
    /// let mut bv: BitVector = BitVector::from_elem(100, true);
    /// bv.remove_all(false);
    /// assert!(bv.is_empty());
    /// assert_eq!(bv.capacity(), 0);
    /// ```
    pub fn remove_all(&mut self, keep_capacity: bool) {
        if keep_capacity {
            self.storage.clear();
        } else {
            self.storage = Vec::new();
        }
        self.nbits = 0;
        self.ones = 0;
    }

    /// Returns the total number of bits in this vector
    #[inline]
    pub fn len(&self) -> usize {
        self.nbits
    }

    /// Returns true if there are no bits in this vector
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all bits from this vector, keeping its capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.remove_all(true);
    }

    /// Rebuilds the vector with `start..end` replaced, writing every word
    /// from scratch and recounting the set bits. Reference for
    /// `replace_range`.
    #[cfg(test)]
    fn rebuilt(&self, start: usize, end: usize, replace_with: &[bool]) -> Self {
        let nbits = self.nbits - (end - start) + replace_with.len();
        let mut storage: Vec<B> = repeat(B::zero())
            .take(blocks_for_bits::<B>(nbits))
            .collect();
        let bits = self
            .iter_range(..start)
            .chain(replace_with.iter().copied())
            .chain(self.iter_range(end..));
        for (i, bit) in bits.enumerate() {
            if bit {
                let block = &mut storage[i / B::bits()];
                *block = *block | (B::one() << (i % B::bits()));
            }
        }
        let ones = storage.iter().map(|&block| block.count_ones()).sum();
        BitVector {
            storage,
            nbits,
            ones,
        }
    }
}

impl<B: BitBlock> Default for BitVector<B> {
    #[inline]
    fn default() -> Self {
        BitVector::new()
    }
}

impl<B: BitBlock> FromIterator<bool> for BitVector<B> {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut ret = BitVector::new();
        ret.extend(iter);
        ret
    }
}

impl<B: BitBlock> Extend<bool> for BitVector<B> {
    #[inline]
    fn extend<I: IntoIterator<Item = bool>>(&mut self, iterable: I) {
        let iterator = iterable.into_iter();
        let (min, _) = iterator.size_hint();
        self.reserve(min);
        for element in iterator {
            self.push(element)
        }
    }
}

impl<B: BitBlock> FromStr for BitVector<B> {
    type Err = ParseBitVectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bit_vec = BitVector::with_capacity(s.len());
        for (index, found) in s.chars().enumerate() {
            match found {
                '0' => bit_vec.push(false),
                '1' => bit_vec.push(true),
                _ => {
                    log::debug!("rejecting {:?} at position {} of binary digits", found, index);
                    return Err(ParseBitVectorError { index, found });
                }
            }
        }
        Ok(bit_vec)
    }
}

impl<B: BitBlock> Clone for BitVector<B> {
    #[inline]
    fn clone(&self) -> Self {
        BitVector {
            storage: self.storage.clone(),
            nbits: self.nbits,
            ones: self.ones,
        }
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        self.nbits = source.nbits;
        self.ones = source.ones;
        self.storage.clone_from(&source.storage);
    }
}

impl<B: BitBlock> PartialOrd for BitVector<B> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<B: BitBlock> Ord for BitVector<B> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<B: BitBlock> fmt::Display for BitVector<B> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for bit in self {
            fmt.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl<B: BitBlock> fmt::Debug for BitVector<B> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

impl<B: BitBlock> hash::Hash for BitVector<B> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.nbits.hash(state);
        for elem in self.logical_blocks() {
            elem.hash(state);
        }
    }
}

impl<B: BitBlock> PartialEq for BitVector<B> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.nbits == other.nbits
            && self.ones == other.ones
            && self.logical_blocks().eq(other.logical_blocks())
    }
}

impl<B: BitBlock> Eq for BitVector<B> {}

impl<B: BitBlock> From<&BitVector<B>> for Vec<u8> {
    fn from(bit_vec: &BitVector<B>) -> Self {
        bit_vec.to_bytes()
    }
}

/// An iterator for `BitVector`.
#[derive(Clone)]
pub struct Iter<'a, B: 'a> {
    bit_vec: &'a BitVector<B>,
    next_idx: usize,
    end_idx: usize,
}

impl<'a, B: BitBlock> Iterator for Iter<'a, B> {
    type Item = bool;

    #[inline]
    fn next(&mut self) -> Option<bool> {
        if self.next_idx != self.end_idx {
            let idx = self.next_idx;
            self.next_idx += 1;
            Some(self.bit_vec.bit(idx))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = self.end_idx - self.next_idx;
        (rem, Some(rem))
    }

    #[inline]
    fn nth(&mut self, n: usize) -> Option<bool> {
        if n >= self.end_idx - self.next_idx {
            self.next_idx = self.end_idx;
            return None;
        }
        self.next_idx += n;
        self.next()
    }
}

impl<'a, B: BitBlock> DoubleEndedIterator for Iter<'a, B> {
    #[inline]
    fn next_back(&mut self) -> Option<bool> {
        if self.next_idx != self.end_idx {
            self.end_idx -= 1;
            Some(self.bit_vec.bit(self.end_idx))
        } else {
            None
        }
    }
}

impl<'a, B: BitBlock> ExactSizeIterator for Iter<'a, B> {}

impl<'a, B: BitBlock> FusedIterator for Iter<'a, B> {}

impl<'a, B: BitBlock> IntoIterator for &'a BitVector<B> {
    type Item = bool;
    type IntoIter = Iter<'a, B>;

    fn into_iter(self) -> Iter<'a, B> {
        self.iter()
    }
}

#[cfg(feature = "serde")]
impl<B: BitBlock> serde::Serialize for BitVector<B> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_binary_string())
    }
}

#[cfg(feature = "serde")]
impl<'de, B: BitBlock> serde::Deserialize<'de> for BitVector<B> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BinaryDigits<B>(core::marker::PhantomData<B>);

        impl<'de, B: BitBlock> serde::de::Visitor<'de> for BinaryDigits<B> {
            type Value = BitVector<B>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string of binary digits")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(BinaryDigits(core::marker::PhantomData))
    }
}

#[cfg(feature = "borsh")]
impl<B: BitBlock> borsh::BorshSerialize for BitVector<B> {
    fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
        borsh::BorshSerialize::serialize(&(self.nbits as u64), writer)?;
        borsh::BorshSerialize::serialize(&self.to_bytes(), writer)
    }
}

#[cfg(feature = "borsh")]
impl<B: BitBlock> borsh::BorshDeserialize for BitVector<B> {
    fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
        use borsh::io::{Error, ErrorKind};

        let nbits = <u64 as borsh::BorshDeserialize>::deserialize_reader(reader)?;
        let bytes = <Vec<u8> as borsh::BorshDeserialize>::deserialize_reader(reader)?;
        let nbits = usize::try_from(nbits)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "bit length overflows usize"))?;
        if bytes.len() != blocks_for_bits::<u8>(nbits) {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "byte length does not match bit length",
            ));
        }
        let extra_bits = nbits % 8;
        if extra_bits > 0 && bytes.last().is_some_and(|&last| last & (0xFF >> extra_bits) != 0) {
            return Err(Error::new(ErrorKind::InvalidData, "non-zero padding bits"));
        }
        let mut bit_vec = BitVector::from_bytes(&bytes);
        bit_vec.truncate(nbits);
        Ok(bit_vec)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::string::ToString;
    use std::{format, vec};

    type Bv = BitVector<u8>;

    fn check_invariants<B: BitBlock>(bv: &BitVector<B>) {
        assert_eq!(bv.storage.len(), blocks_for_bits::<B>(bv.nbits));
        if let Some(&last) = bv.storage.last() {
            assert!((last & !mask_for_bits::<B>(bv.nbits)) == B::zero());
        }
        let recount: usize = bv.storage.iter().map(|&block| block.count_ones()).sum();
        assert_eq!(bv.ones, recount);
        assert_eq!(bv.ones, bv.iter().filter(|&bit| bit).count());
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn random_bits(rng: &mut XorShiftRng, max_len: usize) -> Vec<bool> {
        let len = rng.random_range(0..=max_len);
        (0..len).map(|_| rng.random()).collect()
    }

    #[test]
    fn test_to_str() {
        let zerolen = Bv::new();
        assert_eq!(format!("{:?}", zerolen), "");

        let eightbits = Bv::from_elem(8, false);
        assert_eq!(format!("{:?}", eightbits), "00000000");
        assert_eq!(eightbits.to_string(), "00000000");
    }

    #[test]
    fn test_0_elements() {
        let act = Bv::new();
        assert!(act.eq_vec(&[]));
        assert!(act.none() && act.all());
        assert_eq!(act.count_ones(), 0);
        assert!(act.storage.is_empty());
    }

    #[test]
    fn test_from_elem() {
        for len in [0, 1, 7, 8, 9, 16, 17, 63, 64, 65] {
            let ones = Bv::from_elem(len, true);
            assert_eq!(ones.len(), len);
            assert_eq!(ones.count_ones(), len);
            check_invariants(&ones);
            assert_eq!(ones, (0..len).map(|_| true).collect::<Bv>());

            let zeros = BitVector::<usize>::from_elem(len, false);
            assert_eq!(zeros.len(), len);
            assert_eq!(zeros.count_ones(), 0);
            assert_eq!(zeros.count_zeros(), len);
            check_invariants(&zeros);
        }
    }

    #[test]
    fn test_from_binary_str() {
        let bv = Bv::from_binary_str("10110").unwrap();
        assert_eq!(bv.len(), 5);
        assert_eq!(bv.count_ones(), 3);
        assert_eq!(bv.to_bytes(), [0b10110000]);
        check_invariants(&bv);

        assert_eq!(Bv::from_binary_str(""), Some(Bv::new()));
        assert_eq!(Bv::from_binary_str("10 1"), None);
        assert_eq!(Bv::from_binary_str("1012"), None);
    }

    #[test]
    fn test_parse_error() {
        let err = "0110x1".parse::<Bv>().unwrap_err();
        assert_eq!(err, ParseBitVectorError { index: 4, found: 'x' });
        assert_eq!(err.to_string(), "invalid binary digit 'x' at position 4");
    }

    #[test]
    fn test_from_bytes() {
        let bv = Bv::from_bytes(&[0b10110110, 0b00000000, 0b11111111]);
        let str = concat!("10110110", "00000000", "11111111");
        assert_eq!(format!("{:?}", bv), str);
        assert_eq!(bv.count_ones(), 13);
        check_invariants(&bv);

        let wide = BitVector::<u32>::from_bytes(&[0b10110110, 0b00000000, 0b11111111]);
        assert_eq!(wide.to_string(), str);
        assert_eq!(wide.storage.len(), 1);
        assert_eq!(wide.to_bytes(), [0b10110110, 0b00000000, 0b11111111]);
    }

    #[test]
    fn test_from_flags() {
        let bv = Bv::from_flags([0i32, -1, 0, 7, 0]);
        assert_eq!(bv.to_binary_string(), "01010");
        assert_eq!(bv.count_ones(), 2);
    }

    #[test]
    fn test_to_bytes() {
        let mut bv = Bv::from_elem(3, true);
        bv.set(1, false);
        assert_eq!(bv.to_bytes(), vec![0b10100000]);

        let mut bv = BitVector::<u64>::from_elem(9, false);
        bv.set(2, true);
        bv.set(8, true);
        assert_eq!(bv.to_bytes(), vec![0b00100000, 0b10000000]);

        assert!(Bv::new().to_bytes().is_empty());
        assert_eq!(&*Bv::from_elem(12, true).into_boxed_bytes(), &[0xFF, 0xF0]);
    }

    #[test]
    fn test_byte_round_trip() {
        let mut rng = XorShiftRng::seed_from_u64(0x0b17_e5);
        for _ in 0..100 {
            let bits = random_bits(&mut rng, 100);
            let bv = BitVector::<u16>::from_bools(&bits);
            let back = BitVector::<u16>::from_bytes(&bv.to_bytes());
            assert_eq!(back.len(), bits.len().div_ceil(8) * 8);
            assert!(back.iter_range(..bits.len()).eq(bits.iter().copied()));
            assert!(back.iter_range(bits.len()..).all(|bit| !bit));
            if bits.len() % 8 == 0 {
                assert_eq!(back, bv);
            }
        }
    }

    #[test]
    fn test_binary_string_round_trip() {
        let mut rng = XorShiftRng::seed_from_u64(0x5712_1e);
        for _ in 0..100 {
            let bv = Bv::from_bools(&random_bits(&mut rng, 80));
            assert_eq!(Bv::from_binary_str(&bv.to_binary_string()), Some(bv.clone()));
            assert_eq!(bv.to_bools().len(), bv.len());
        }
    }

    #[test]
    fn test_set_get() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let mut bv = Bv::from_elem(77, false);
        let mut model = vec![false; 77];
        for _ in 0..1000 {
            let i = rng.random_range(0..77);
            let x = rng.random();
            bv.set(i, x);
            model[i] = x;
            assert_eq!(bv.get(i), Some(x));
            assert_eq!(bv[i], x);
            assert!(bv.eq_vec(&model));
            assert_eq!(bv.count_ones(), model.iter().filter(|&&b| b).count());
        }
        assert_eq!(bv.get(77), None);
    }

    #[test]
    fn test_set_same_value_keeps_count() {
        let mut bv = Bv::from_binary_str("101").unwrap();
        bv.set(0, true);
        bv.set(1, false);
        assert_eq!(bv.count_ones(), 2);
        check_invariants(&bv);
    }

    #[test]
    fn test_push_then_remove() {
        let mut bv = Bv::new();
        bv.push(true);
        bv.push(true);
        bv.push(true);
        assert!(bv.remove(1));
        assert_eq!(bv.to_binary_string(), "11");
        assert_eq!(bv.count_ones(), 2);
        check_invariants(&bv);
    }

    #[test]
    fn test_push_pop_across_blocks() {
        let mut bv = Bv::new();
        for i in 0..20 {
            bv.push(i % 3 == 0);
            check_invariants(&bv);
        }
        assert_eq!(bv.storage.len(), 3);
        for i in (0..20).rev() {
            assert_eq!(bv.pop(), Some(i % 3 == 0));
            check_invariants(&bv);
        }
        assert_eq!(bv.pop(), None);
        assert!(bv.storage.is_empty());
    }

    #[test]
    fn test_insert_remove_is_noop() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        for _ in 0..200 {
            let original = Bv::from_bools(&random_bits(&mut rng, 40));
            let index = rng.random_range(0..=original.len());
            let bit = rng.random();
            let mut bv = original.clone();
            bv.insert(index, bit);
            assert_eq!(bv.len(), original.len() + 1);
            assert_eq!(bv[index], bit);
            check_invariants(&bv);
            assert_eq!(bv.remove(index), bit);
            assert_eq!(bv, original);
            check_invariants(&bv);
        }
    }

    #[test]
    fn test_remove_first_and_last() {
        let mut bv = Bv::from_binary_str("1001").unwrap();
        assert!(bv.remove_first());
        assert!(bv.remove_last());
        assert_eq!(bv.to_binary_string(), "00");
        assert_eq!(bv.count_ones(), 0);
    }

    #[test]
    fn test_replace_range() {
        let mut bv = Bv::from_binary_str("11011").unwrap();
        bv.replace_range(1..3, [false, false, false]);
        assert_eq!(bv.to_binary_string(), "100011");
        assert_eq!(bv.count_ones(), 3);
        check_invariants(&bv);

        bv.replace_range(2..=3, []);
        assert_eq!(bv.to_binary_string(), "1011");
        bv.replace_range(.., [true]);
        assert_eq!(bv.to_binary_string(), "1");
        bv.replace_range(1.., [false, true]);
        assert_eq!(bv.to_binary_string(), "101");
        assert_eq!(bv.count_ones(), 2);
        check_invariants(&bv);
    }

    #[test]
    fn test_replace_range_matches_rebuild() {
        let mut rng = XorShiftRng::seed_from_u64(0xdead_beef);
        for _ in 0..500 {
            let bv = Bv::from_bools(&random_bits(&mut rng, 70));
            let start = rng.random_range(0..=bv.len());
            let end = rng.random_range(start..=bv.len());
            let replace_with = random_bits(&mut rng, 30);

            let expected = bv.rebuilt(start, end, &replace_with);
            let mut actual = bv.clone();
            actual.replace_range(start..end, replace_with.iter().copied());

            check_invariants(&actual);
            check_invariants(&expected);
            assert_eq!(actual.storage, expected.storage);
            assert_eq!(actual.count_ones(), expected.count_ones());
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_random_mutations_match_model() {
        let mut rng = XorShiftRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let mut bv = Bv::new();
            let mut model: Vec<bool> = Vec::new();
            for _ in 0..200 {
                match rng.random_range(0..7) {
                    0 => {
                        let bit = rng.random();
                        bv.push(bit);
                        model.push(bit);
                    }
                    1 => {
                        let index = rng.random_range(0..=model.len());
                        let bit = rng.random();
                        bv.insert(index, bit);
                        model.insert(index, bit);
                    }
                    2 if !model.is_empty() => {
                        let index = rng.random_range(0..model.len());
                        assert_eq!(bv.remove(index), model.remove(index));
                    }
                    3 if !model.is_empty() => {
                        let index = rng.random_range(0..model.len());
                        let bit = rng.random();
                        bv.set(index, bit);
                        model[index] = bit;
                    }
                    4 => {
                        let start = rng.random_range(0..=model.len());
                        let end = rng.random_range(start..=model.len());
                        let replace_with = random_bits(&mut rng, 12);
                        bv.replace_range(start..end, replace_with.iter().copied());
                        model.splice(start..end, replace_with);
                    }
                    5 => assert_eq!(bv.pop(), model.pop()),
                    6 => {
                        let n = rng.random_range(0..20);
                        let bit = rng.random();
                        bv.grow(n, bit);
                        model.extend(iter::repeat(bit).take(n));
                    }
                    _ => {}
                }
                check_invariants(&bv);
                assert!(bv.eq_vec(&model));
            }
        }
    }

    #[test]
    fn test_shrinking_leaves_no_stale_bits() {
        let mut bv = Bv::from_elem(20, true);
        bv.truncate(10);
        check_invariants(&bv);
        assert_eq!(bv.storage, vec![0xFF, 0b11]);
        assert_eq!(bv, Bv::from_elem(10, true));
        assert_eq!(hash_of(&bv), hash_of(&Bv::from_elem(10, true)));

        let mut bv = Bv::from_elem(20, true);
        bv.replace_range(5..15, []);
        check_invariants(&bv);
        assert_eq!(bv.storage, vec![0xFF, 0b11]);
        assert_eq!(bv.count_ones(), 10);

        let mut bv = Bv::from_elem(9, true);
        bv.remove(0);
        check_invariants(&bv);
        assert_eq!(bv.storage, vec![0xFF]);
    }

    #[test]
    fn test_eq_ignores_padding() {
        let dirty = Bv {
            storage: vec![0xFF],
            nbits: 4,
            ones: 4,
        };
        let clean = Bv::from_elem(4, true);
        assert_eq!(dirty, clean);
        assert_eq!(hash_of(&dirty), hash_of(&clean));
    }

    #[test]
    fn test_eq_across_construction_paths() {
        let from_str = Bv::from_binary_str("0100000110").unwrap();
        let from_bools = Bv::from_bools(&[
            false, true, false, false, false, false, false, true, true, false,
        ]);
        let from_flags = Bv::from_flags([0, 1, 0, 0, 0, 0, 0, 1, 1, 0]);
        let mut from_bytes = Bv::from_bytes(&[0b01000001, 0b10111111]);
        from_bytes.truncate(10);
        let mut from_edits = Bv::from_elem(10, false);
        from_edits.set(1, true);
        from_edits.replace_range(7..9, [true, true]);

        for other in [&from_bools, &from_flags, &from_bytes, &from_edits] {
            assert_eq!(&from_str, other);
            assert_eq!(hash_of(&from_str), hash_of(other));
        }

        assert_ne!(from_str, Bv::from_binary_str("01000001100").unwrap());
        assert_ne!(from_str, Bv::from_binary_str("0100000111").unwrap());
    }

    #[test]
    fn test_ordering() {
        let parse = |s: &str| Bv::from_binary_str(s).unwrap();
        assert!(parse("") < parse("0"));
        assert!(parse("0") < parse("1"));
        assert!(parse("01") < parse("1"));
        assert!(parse("1") < parse("10"));
        assert_eq!(parse("101").cmp(&parse("101")), Ordering::Equal);
    }

    #[test]
    fn test_iter() {
        let bv = Bv::from_binary_str("10110").unwrap();
        assert_eq!(bv.iter().len(), 5);
        assert_eq!(bv.iter().rev().collect::<Vec<_>>(), [false, true, true, false, true]);

        let mut iter = bv.iter();
        assert_eq!(iter.nth(2), Some(true));
        assert_eq!(iter.next(), Some(true));
        assert_eq!(iter.next(), Some(false));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);

        let mut iter = bv.iter();
        assert_eq!(iter.nth(5), None);
        assert_eq!(iter.next(), None);

        // restartable
        assert_eq!(bv.iter().collect::<Vec<_>>(), bv.iter().collect::<Vec<_>>());
        assert_eq!((&bv).into_iter().filter(|&bit| bit).count(), 3);
    }

    #[test]
    fn test_slice() {
        let bv = BitVector::<u32>::from_binary_str("1101001").unwrap();
        assert_eq!(bv.slice(2..5).to_binary_string(), "010");
        assert_eq!(bv.slice(..).to_binary_string(), "1101001");
        assert!(bv.slice(3..3).is_empty());
        assert_eq!(bv.iter_range(4..).collect::<Vec<_>>(), [false, false, true]);
    }

    #[test]
    fn test_grow() {
        let mut bv = Bv::from_bytes(&[0b01001011]);
        bv.grow(2, true);
        assert_eq!(bv.len(), 10);
        assert_eq!(bv.to_bytes(), vec![0b01001011, 0b11000000]);
        assert_eq!(bv.count_ones(), 6);
        check_invariants(&bv);

        let mut bv = Bv::from_binary_str("101").unwrap();
        bv.grow(3, true);
        check_invariants(&bv);
        assert_eq!(bv.to_binary_string(), "101111");
        bv.grow(13, false);
        check_invariants(&bv);
        assert_eq!(bv.len(), 19);
        assert_eq!(bv.count_ones(), 5);
    }

    #[test]
    fn test_word_boundaries_native() {
        let bits = usize::BITS as usize;
        let mut bv = BitVector::<usize>::from_elem(bits, true);
        bv.push(false);
        assert_eq!(bv.storage.len(), 2);
        bv.insert(0, false);
        assert_eq!(bv.count_ones(), bits);
        assert!(!bv[0] && bv[1] && bv[bits] && !bv[bits + 1]);
        check_invariants(&bv);
        bv.remove(0);
        bv.pop();
        assert_eq!(bv, BitVector::<usize>::from_elem(bits, true));
        assert_eq!(bv.storage.len(), 1);
    }

    #[test]
    fn test_reserve_keeps_content() {
        let mut bv = Bv::from_binary_str("101").unwrap();
        let before = bv.clone();
        bv.reserve_capacity(100);
        assert!(bv.capacity() >= 100);
        assert_eq!(bv, before);
        assert_eq!(bv.count_ones(), 2);
        check_invariants(&bv);

        bv.reserve(200);
        assert!(bv.capacity() >= 203);
        assert_eq!(bv, before);
    }

    #[test]
    fn test_remove_all() {
        let mut bv = Bv::from_elem(100, true);
        bv.remove_all(true);
        assert!(bv.is_empty());
        assert_eq!(bv.count_ones(), 0);
        assert!(bv.capacity() >= 100);
        check_invariants(&bv);

        bv.extend([true, false]);
        bv.remove_all(false);
        assert_eq!(bv.capacity(), 0);

        let mut bv = Bv::from_elem(10, true);
        bv.clear();
        assert_eq!(bv, Bv::new());
    }

    #[test]
    fn test_clone_from() {
        let source = Bv::from_binary_str("1110").unwrap();
        let mut target = Bv::from_elem(40, false);
        target.clone_from(&source);
        assert_eq!(target, source);
        assert_eq!(target.count_ones(), 3);
        check_invariants(&target);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_index_out_of_bounds() {
        let bv = Bv::from_elem(3, false);
        let _ = bv[3];
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_set_out_of_bounds() {
        let mut bv = Bv::from_elem(3, false);
        bv.set(3, true);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_remove_out_of_bounds() {
        let mut bv = Bv::from_elem(3, false);
        bv.remove(3);
    }

    #[test]
    #[should_panic(expected = "insertion index")]
    fn test_insert_out_of_bounds() {
        let mut bv = Bv::from_elem(3, false);
        bv.insert(4, true);
    }

    #[test]
    #[should_panic(expected = "empty BitVector")]
    fn test_remove_last_empty() {
        Bv::new().remove_last();
    }

    #[test]
    #[should_panic(expected = "empty BitVector")]
    fn test_remove_first_empty() {
        Bv::new().remove_first();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_replace_range_out_of_bounds() {
        let mut bv = Bv::from_elem(3, false);
        bv.replace_range(2..4, [true]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() {
        let bv = Bv::from_binary_str("10110").unwrap();
        let json = serde_json::to_string(&bv).unwrap();
        assert_eq!(json, "\"10110\"");
        assert_eq!(serde_json::from_str::<Bv>(&json).unwrap(), bv);
        assert!(serde_json::from_str::<Bv>("\"10210\"").is_err());
    }

    #[cfg(feature = "borsh")]
    #[test]
    fn test_borsh() {
        let bv = Bv::from_binary_str("1011001101").unwrap();
        let bytes = borsh::to_vec(&bv).unwrap();
        let back: Bv = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back, bv);
        check_invariants(&back);

        let padded = borsh::to_vec(&(3u64, vec![0xFFu8])).unwrap();
        assert!(borsh::from_slice::<Bv>(&padded).is_err());
        let short = borsh::to_vec(&(9u64, vec![0xFFu8])).unwrap();
        assert!(borsh::from_slice::<Bv>(&short).is_err());
    }
}
