/// Strong password generation for credential rotation
use rand::{seq::SliceRandom, Rng};

pub const PASSWORD_LENGTH: usize = 12;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
pub const SPECIAL: &[u8] = b"!@#$%^&*";

/// Generate a 12 character password with at least one lowercase, uppercase,
/// digit and special character
pub fn generate_strong_password() -> String {
    generate_password_with(&mut rand::thread_rng(), PASSWORD_LENGTH)
}

/// Generate a password of `length` characters (never fewer than one per class)
/// from the given RNG
pub fn generate_password_with<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let mut chars = vec![
        pick(rng, LOWERCASE),
        pick(rng, UPPERCASE),
        pick(rng, DIGITS),
        pick(rng, SPECIAL),
    ];

    let alphabet: Vec<u8> = [LOWERCASE, UPPERCASE, DIGITS, SPECIAL].concat();
    while chars.len() < length {
        chars.push(pick(rng, &alphabet));
    }

    chars.shuffle(rng);
    chars.into_iter().collect()
}

fn pick<R: Rng + ?Sized>(rng: &mut R, charset: &[u8]) -> char {
    charset[rng.gen_range(0..charset.len())] as char
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn satisfies_policy(password: &str) -> bool {
        password.chars().count() == PASSWORD_LENGTH
            && password.chars().any(|c| c.is_ascii_lowercase())
            && password.chars().any(|c| c.is_ascii_uppercase())
            && password.chars().any(|c| c.is_ascii_digit())
            && password.bytes().any(|b| SPECIAL.contains(&b))
    }

    #[test]
    fn test_generated_passwords_meet_policy() {
        for _ in 0..500 {
            let password = generate_strong_password();
            assert!(satisfies_policy(&password), "weak password: {}", password);
        }
    }

    #[test]
    fn test_only_known_characters() {
        let password = generate_strong_password();
        assert!(password
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || SPECIAL.contains(&b)));
    }

    #[test]
    fn test_required_classes_are_not_always_in_front() {
        // Shuffling must move the guaranteed characters around
        let mut rng = StdRng::seed_from_u64(7);
        let first_chars: std::collections::HashSet<bool> = (0..50)
            .map(|_| {
                generate_password_with(&mut rng, PASSWORD_LENGTH)
                    .chars()
                    .next()
                    .map(|c| c.is_ascii_lowercase())
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(first_chars.len(), 2);
    }

    #[test]
    fn test_short_length_still_has_every_class() {
        let mut rng = StdRng::seed_from_u64(42);
        let password = generate_password_with(&mut rng, 2);
        assert_eq!(password.len(), 4);
    }

    #[test]
    fn test_passwords_differ() {
        let a = generate_strong_password();
        let b = generate_strong_password();
        assert_ne!(a, b);
    }
}
