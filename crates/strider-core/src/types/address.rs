//! Target address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the target's address space
///
/// Wrapping `u64` keeps addresses from being mixed up with sizes, line numbers
/// or counters. Every program counter, stack pointer and variable location the
/// core handles is an `Address`.
///
/// ## Example
///
/// ```rust
/// use strider_core::types::Address;
///
/// let entry = Address::from(0x401000);
/// assert_eq!((entry + 0x10).value(), 0x401010);
/// assert_eq!(entry.offset(-0x10).value(), 0x400ff0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address, used as the "no caller" sentinel while unwinding.
    pub const ZERO: Self = Address(0);

    /// Create an address in const contexts.
    ///
    /// ```rust
    /// use strider_core::types::Address;
    ///
    /// const TEXT_BASE: Address = Address::new(0x401000);
    /// assert_eq!(TEXT_BASE.value(), 0x401000);
    /// ```
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw `u64` value of this address.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    #[must_use]
    pub const fn is_zero(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, returning `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Apply a signed displacement (CFA-relative variable slots, frame offsets).
    ///
    /// Wraps on overflow, matching how the hardware computes effective addresses.
    #[must_use]
    pub const fn offset(self, delta: i64) -> Self
    {
        Address(self.0.wrapping_add_signed(delta))
    }

    /// Distance in bytes from `other` up to `self`, or `None` if `other` is higher.
    #[must_use]
    pub fn distance_from(self, other: Address) -> Option<u64>
    {
        self.0.checked_sub(other.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
