//! Status bit-field decoding.

use super::ProtocolError;

/// Named flags unpacked from the board's two-digit hex status token.
/// Bits are assigned left to right, most significant first, in the
/// declaration order below. Flags are decoded fresh per query and never
/// cached between queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub gpio_rb5: bool,
    pub gpio_rb2: bool,
    pub button_pressed: bool,
    pub pen_down: bool,
    pub command_executing: bool,
    pub motor1_moving: bool,
    pub motor2_moving: bool,
    pub queue_not_empty: bool,
}

impl StatusFlags {
    /// Decodes a fixed-width hex token. Tokens of any other length, or
    /// with non-hex characters, are protocol errors.
    pub fn parse(token: &str) -> Result<Self, ProtocolError> {
        let token = token.trim();
        if token.len() != 2 {
            return Err(ProtocolError::BadStatusToken(token.to_string()));
        }
        let bits = u8::from_str_radix(token, 16)
            .map_err(|_| ProtocolError::BadStatusToken(token.to_string()))?;
        Ok(Self::from_bits(bits))
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            gpio_rb5: bits & 0x80 != 0,
            gpio_rb2: bits & 0x40 != 0,
            button_pressed: bits & 0x20 != 0,
            pen_down: bits & 0x10 != 0,
            command_executing: bits & 0x08 != 0,
            motor1_moving: bits & 0x04 != 0,
            motor2_moving: bits & 0x02 != 0,
            queue_not_empty: bits & 0x01 != 0,
        }
    }

    /// Idle means nothing queued and neither motor moving. Further
    /// motion may only be issued once this holds.
    pub fn is_idle(&self) -> bool {
        !self.queue_not_empty && !self.motor1_moving && !self.motor2_moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_command_executing_bit() {
        let flags = StatusFlags::parse("08").unwrap();
        assert!(flags.command_executing);
        assert!(!flags.gpio_rb5);
        assert!(!flags.gpio_rb2);
        assert!(!flags.button_pressed);
        assert!(!flags.pen_down);
        assert!(!flags.motor1_moving);
        assert!(!flags.motor2_moving);
        assert!(!flags.queue_not_empty);
    }

    #[test]
    fn round_trips_all_bit_patterns() {
        for bits in 0..=u8::MAX {
            let token = format!("{bits:02X}");
            assert_eq!(StatusFlags::parse(&token).unwrap(), StatusFlags::from_bits(bits));
        }
    }

    #[test]
    fn bit_order_is_msb_first() {
        let flags = StatusFlags::from_bits(0b1000_0001);
        assert!(flags.gpio_rb5);
        assert!(flags.queue_not_empty);
        assert!(!flags.motor2_moving);
    }

    #[test]
    fn rejects_tokens_of_unexpected_length() {
        assert!(StatusFlags::parse("").is_err());
        assert!(StatusFlags::parse("1").is_err());
        assert!(StatusFlags::parse("123").is_err());
        assert!(StatusFlags::parse("ZZ").is_err());
    }

    #[test]
    fn busy_while_queued_or_moving() {
        assert!(StatusFlags::from_bits(0x00).is_idle());
        // Command-executing alone does not block further motion.
        assert!(StatusFlags::from_bits(0x08).is_idle());
        assert!(!StatusFlags::from_bits(0x01).is_idle());
        assert!(!StatusFlags::from_bits(0x02).is_idle());
        assert!(!StatusFlags::from_bits(0x04).is_idle());
    }
}
