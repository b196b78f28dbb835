use std::net::{IpAddr, Ipv4Addr};

use crate::error::{PingError, Result};

/// Parse the destination as a literal IPv4 address. No name lookup is done.
pub fn parse_target(dest: &str) -> Result<Ipv4Addr> {
    match dest.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(_)) => Err(PingError::InvalidTarget(format!("{} is an IPv6 address", dest))),
        Err(_) => Err(PingError::InvalidTarget(format!("{} is not an IPv4 address", dest))),
    }
}

/// Zero the 16 bit field at byte offset `location`, then store the checksum of the
/// whole buffer there (big endian).
#[allow(clippy::double_parens)] // For stylistic reasons
pub fn set_checksum(data: &mut [u8], location: usize) {
    data[location    ] = 0;
    data[location + 1] = 0;

    let sum = checksum(data);
    data[location    ] = ((sum & 0xFF00) >> 8) as u8;
    data[location + 1] = ((sum & 0x00FF)     ) as u8;
}

/// Internet checksum (RFC 1071) over the full buffer.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = sum_be_words(data);
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }

    !sum as u16 // The checksum field should be the ones complement of the sum
}

/// A buffer that already carries its checksum sums to zero.
pub fn verify_checksum(data: &[u8]) -> bool {
    checksum(data) == 0
}

/// Sum all words (16 bit chunks) in the given data. Each word is treated as big
/// endian, so a trailing odd byte is the high half of a zero padded word.
fn sum_be_words(data: &[u8]) -> u32 {
    data.chunks(2)
        .map(|word| match *word {
            [wh] => u16::from_be_bytes([wh, 0]),
            [wh, wl] => u16::from_be_bytes([wh, wl]),
            _ => unreachable!(),
        })
        .map(u32::from)
        .fold(0, u32::wrapping_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_buffer() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn checksum_of_single_word() {
        assert_eq!(checksum(&[0x00, 0x01]), 0xFFFE);
    }

    #[test]
    fn odd_byte_is_high_order() {
        assert_eq!(checksum(&[0x01]), 0xFEFF);
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn carries_fold_back_in() {
        // 0xFFFF + 0x0001 = 0x1_0000 -> 0x0001
        assert_eq!(checksum(&[0xFF, 0xFF, 0x00, 0x01]), !0x0001);
        assert_eq!(checksum(&[0xFF; 20]), 0);
    }

    #[test]
    fn rfc1071_example() {
        // Worked example from RFC 1071 section 3: sum is 0xDDF2
        let data = [0x00, 0x01, 0xF2, 0x03, 0xF4, 0xF5, 0xF6, 0xF7];
        assert_eq!(checksum(&data), !0xDDF2);
    }

    #[test]
    fn stored_checksum_validates_to_zero() {
        let mut data = vec![8, 0, 0xAA, 0xBB, 0x12, 0x34, 0x00, 0x07];
        data.extend((0u8..37).map(|b| b.wrapping_mul(31)));

        set_checksum(&mut data, 2);
        assert_eq!(checksum(&data), 0x0000);
        assert!(verify_checksum(&data));

        data[10] ^= 0x40;
        assert!(!verify_checksum(&data));
    }

    #[test]
    fn parses_literal_ipv4_only() {
        assert_eq!(parse_target("127.0.0.1").unwrap(), Ipv4Addr::LOCALHOST);
        assert_eq!(parse_target(" 10.1.2.3 ").unwrap(), Ipv4Addr::new(10, 1, 2, 3));
        assert!(matches!(parse_target("::1"), Err(PingError::InvalidTarget(_))));
        assert!(matches!(parse_target("example.com"), Err(PingError::InvalidTarget(_))));
    }
}
