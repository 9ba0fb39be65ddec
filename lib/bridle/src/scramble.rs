//! The two XOR scrambling schemes. Lobby/ranch/race frames use a 4-byte
//! rolling code advanced once per inbound frame with a wrapping
//! multiply-add; chatter frames use a fixed 4-byte key over the whole frame,
//! header included. Obfuscation only, not security; the constants are
//! compatibility artifacts pinned by the tests below.

/// Multiplier of the rolling-code step. Legacy LCG constant.
pub const XOR_MULTIPLIER: u32 = 0x0019_660D;
/// Addend of the rolling-code step; `{CB 91 01 A2}` little-endian on the wire.
pub const XOR_CONTROL: u32 = 0xA201_91CB;

/// Fixed chatter key. Never rolls.
pub const CHATTER_KEY: [u8; 4] = [0x2B, 0xFE, 0xB8, 0x02];

/// Per-connection rolling scramble code for the command scheme. Inbound and
/// outbound frames of one connection share the single code; only inbound
/// frames advance it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RollingCode {
    code: u32,
}

impl RollingCode {
    /// The code a freshly accepted connection starts with: one roll from
    /// zero, as the legacy client does on connect.
    #[inline]
    pub fn initial() -> RollingCode {
        let mut code = RollingCode { code: 0 };
        code.roll();
        code
    }

    #[inline]
    pub fn from_value(code: u32) -> RollingCode {
        RollingCode { code }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.code
    }

    /// Resets to the zero code. The lobby does this right after LoginOK so
    /// the first post-login frame scrambles against zero.
    #[inline]
    pub fn reset(&mut self) {
        self.code = 0;
    }

    /// Advances the code by one frame.
    #[inline]
    pub fn roll(&mut self) {
        self.code = self.code.wrapping_mul(XOR_MULTIPLIER).wrapping_add(XOR_CONTROL);
    }

    /// XORs the payload in place against the current code bytes. Symmetric:
    /// applying twice with the same code restores the input.
    #[inline]
    pub fn apply(&self, payload: &mut [u8]) {
        let key = self.code.to_le_bytes();
        for (idx, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[idx % 4];
        }
    }
}

/// XORs a whole chatter frame (header included) in place against the fixed
/// key. Byte `i` of the frame pairs with `CHATTER_KEY[i % 4]`, which leaves
/// the u16 length field XORed with 0xFE2B and the u16 command id with 0x02B8.
#[inline]
pub fn chatter_apply(frame: &mut [u8]) {
    for (idx, byte) in frame.iter_mut().enumerate() {
        *byte ^= CHATTER_KEY[idx % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_code_is_one_roll_from_zero() {
        assert_eq!(RollingCode::initial().value(), XOR_CONTROL);
    }

    #[test]
    fn test_roll_is_wrapping_multiply_add() {
        let mut code = RollingCode::from_value(0xDEAD_BEEF);
        code.roll();

        assert_eq!(
            code.value(),
            0xDEAD_BEEFu32
                .wrapping_mul(XOR_MULTIPLIER)
                .wrapping_add(XOR_CONTROL)
        );
    }

    #[test]
    fn test_scramble_roundtrip_with_frame_advance() {
        let plain: Vec<u8> = (0u8..=255).cycle().take(777).collect();
        let mut code = RollingCode::from_value(0x1234_5678);

        let mut scrambled = plain.clone();
        code.apply(&mut scrambled);
        assert_ne!(scrambled, plain);

        // The receiver holds the same pre-frame code.
        let receiver = RollingCode::from_value(0x1234_5678);
        receiver.apply(&mut scrambled);
        assert_eq!(scrambled, plain);

        code.roll();
        assert_eq!(
            code.value(),
            0x1234_5678u32
                .wrapping_mul(XOR_MULTIPLIER)
                .wrapping_add(XOR_CONTROL)
        );
    }

    #[test]
    fn test_zero_code_is_identity() {
        let mut payload = vec![0x11u8, 0x22, 0x33, 0x44, 0x55];
        let original = payload.clone();

        RollingCode::from_value(0).apply(&mut payload);
        assert_eq!(payload, original);
    }

    #[test]
    fn test_key_bytes_are_little_endian() {
        let mut payload = vec![0u8; 4];
        RollingCode::from_value(0xA201_91CB).apply(&mut payload);

        assert_eq!(payload, vec![0xCB, 0x91, 0x01, 0xA2]);
    }

    #[test]
    fn test_reset_then_roll_matches_initial() {
        let mut code = RollingCode::from_value(0xFFFF_FFFF);
        code.reset();
        code.roll();

        assert_eq!(code, RollingCode::initial());
    }

    #[test]
    fn test_chatter_roundtrip_and_key_does_not_change() {
        let plain: Vec<u8> = (0u8..200).collect();

        let mut frame = plain.clone();
        chatter_apply(&mut frame);
        assert_ne!(frame, plain);
        chatter_apply(&mut frame);
        assert_eq!(frame, plain);
    }

    #[test]
    fn test_chatter_header_constants() {
        // length = 0x0010, id = 0x3C1E, assembled little-endian.
        let mut frame = vec![0x10, 0x00, 0x1E, 0x3C];
        chatter_apply(&mut frame);

        let length = u16::from_le_bytes([frame[0], frame[1]]);
        let id = u16::from_le_bytes([frame[2], frame[3]]);

        assert_eq!(length, 0x0010 ^ 0xFE2B);
        assert_eq!(id, 0x3C1E ^ 0x02B8);
    }
}
