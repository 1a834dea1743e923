use rand::Rng;

pub const TICKET_CODE_LENGTH: usize = 12;

// Unambiguous alphabet: no 0/O or 1/I.
const TICKET_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a 12-character ticket code. Uniqueness is enforced by the
/// issuer, which retries against the tickets table on collision.
pub fn generate_ticket_code() -> String {
    let mut rng = rand::thread_rng();
    (0..TICKET_CODE_LENGTH)
        .map(|_| TICKET_CODE_ALPHABET[rng.gen_range(0..TICKET_CODE_ALPHABET.len())] as char)
        .collect()
}
