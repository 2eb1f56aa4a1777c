use crate::config::TurnConfig;
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Prepends the turn: scheme to a TURN host given without one
pub fn add_turn_url_scheme(turn: &TurnConfig) -> String {
    let host = turn.host.trim();
    if host.starts_with("turn:") || host.starts_with("turns:") || host.starts_with("stun:") {
        host.to_string()
    } else {
        format!("turn:{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_sixteen_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }

    #[test]
    fn turn_scheme_is_added_once() {
        let mut turn = TurnConfig {
            host: "relay.example.org:3478".into(),
            ..Default::default()
        };
        assert_eq!(add_turn_url_scheme(&turn), "turn:relay.example.org:3478");

        turn.host = "turns:relay.example.org:5349".into();
        assert_eq!(add_turn_url_scheme(&turn), "turns:relay.example.org:5349");
    }
}
