use super::{Error, Result};
use core::fmt;

enum_with_unknown! {
    /// IPv6 Extension Routing Header Routing Type
    pub enum Type(u8) {
        /// Source Route (DEPRECATED)
        ///
        /// See https://tools.ietf.org/html/rfc5095 for details.
        Type0 = 0,
        /// Nimrod (DEPRECATED 2009-05-06)
        Nimrod = 1,
        /// Type 2 Routing Header for Mobile IPv6
        ///
        /// See https://tools.ietf.org/html/rfc6275#section-6.4 for details.
        Type2 = 2,
        /// Source Routing Header for low-power routing protocols
        ///
        /// See https://tools.ietf.org/html/rfc6554 for details.
        SourceRoute = 3,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Type::Type0 => write!(f, "Type0"),
            Type::Nimrod => write!(f, "Nimrod"),
            Type::Type2 => write!(f, "Type2"),
            Type::SourceRoute => write!(f, "SourceRoute"),
            Type::Unknown(id) => write!(f, "{id}"),
        }
    }
}

/// A read/write wrapper around the type-specific part of an IPv6 Routing Header.
///
/// The buffer starts right after the generic `Next Header` and
/// `Hdr Ext Len` octets, i.e. at the `Routing Type` field.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header<T: AsRef<[u8]>> {
    buffer: T,
}

// Format of the Routing Header
//
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Next Header  |  Hdr Ext Len  |  Routing Type | Segments Left |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// .                                                               .
// .                       type-specific data                      .
// .                                                               .
// |                                                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// See https://tools.ietf.org/html/rfc8200#section-4.4 for details.
//
// **NOTE**: The fields start counting after the header length field.
mod field {
    use crate::wire::field::*;

    pub const MIN_HEADER_SIZE: usize = 2;

    pub const TYPE: usize = 0;
    pub const SEG_LEFT: usize = 1;
    pub const DATA: Rest = 2..;
}

/// Offset of the `Segments Left` octet from the start of the full routing header.
pub const SEG_LEFT_OFFSET: usize = 3;

impl<T: AsRef<[u8]>> Header<T> {
    /// Create a raw octet buffer with an IPv6 Routing Header structure.
    pub const fn new_unchecked(buffer: T) -> Header<T> {
        Header { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Header<T>> {
        let header = Self::new_unchecked(buffer);
        header.check_len()?;
        Ok(header)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < field::MIN_HEADER_SIZE {
            return Err(Error);
        }
        Ok(())
    }

    /// Consume the header, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the routing type field.
    #[inline]
    pub fn routing_type(&self) -> Type {
        let data = self.buffer.as_ref();
        Type::from(data[field::TYPE])
    }

    /// Return the segments left field.
    #[inline]
    pub fn segments_left(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::SEG_LEFT]
    }

    /// Return the type-specific data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buffer.as_ref()[field::DATA]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Header<T> {
    /// Set the routing type.
    #[inline]
    pub fn set_routing_type(&mut self, value: Type) {
        let data = self.buffer.as_mut();
        data[field::TYPE] = value.into();
    }

    /// Set the segments left field.
    #[inline]
    pub fn set_segments_left(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::SEG_LEFT] = value;
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Header<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IPv6 Routing type={} seg_left={}",
            self.routing_type(),
            self.segments_left()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Type 0 routing header data, one segment left.
    static BYTES_TYPE0: [u8; 6] = [0x0, 0x1, 0x0, 0x0, 0x0, 0x0];

    // Source routing header data with nothing left to visit.
    static BYTES_SRH_DONE: [u8; 6] = [0x3, 0x0, 0x0, 0x0, 0x0, 0x0];

    #[test]
    fn test_check_len() {
        assert_eq!(Err(Error), Header::new_unchecked(&BYTES_TYPE0[..1]).check_len());
        assert_eq!(Ok(()), Header::new_unchecked(&BYTES_TYPE0[..]).check_len());
    }

    #[test]
    fn test_header_deconstruct() {
        let header = Header::new_checked(&BYTES_TYPE0[..]).unwrap();
        assert_eq!(header.routing_type(), Type::Type0);
        assert_eq!(header.segments_left(), 1);
        assert_eq!(header.data().len(), 4);

        let header = Header::new_checked(&BYTES_SRH_DONE[..]).unwrap();
        assert_eq!(header.routing_type(), Type::SourceRoute);
        assert_eq!(header.segments_left(), 0);
    }

    #[test]
    fn test_header_construct() {
        let mut bytes = [0xffu8; 6];
        let mut header = Header::new_unchecked(&mut bytes[..]);
        header.set_routing_type(Type::Type2);
        header.set_segments_left(0);
        assert_eq!(&bytes[..2], &[0x2, 0x0]);
    }
}
