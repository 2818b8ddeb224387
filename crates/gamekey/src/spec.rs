use crate::GameKey;

// Aliases that only apply to parsing specs (not emitted by to_spec).
macro_rules! key_spec_aliases {
    ($m:ident, $arg:expr) => {
        $m! { $arg,
            NormalAttack => "attack",
            NormalAttack => "lmb",
            SpecialAttack => "special",
            SpecialAttack => "e",
            Ultimate => "ult",
            Ultimate => "q",
            Dodge => "dash",
            Dodge => "shift",
            Dodge => "rmb",
            SwitchNext => "next",
            SwitchNext => "space",
            SwitchPrev => "prev",
            SwitchPrev => "c",
            MoveForward => "w",
            MoveBack => "s",
            MoveLeft => "a",
            MoveRight => "d",
            Interact => "f",
            Lock => "mmb",
            Menu => "esc",
        }
    };
}

macro_rules! from_spec_match {
    ( $s:expr, $( $k:ident => $v:literal, )* ) => {{
        match $s {
            $( $v => Some(GameKey::$k), )*
            _ => None,
        }
    }}
}

/// Parses a key specification into a `GameKey`.
///
/// First tries the canonical name (case-insensitive). If that fails, falls
/// back to the alias table.
pub fn from_spec(s: &str) -> Option<GameKey> {
    if let Some(k) = GameKey::from_name(s) {
        return Some(k);
    }
    let lowered = s.trim().to_ascii_lowercase();
    key_spec_aliases!(from_spec_match, lowered.as_str())
}

/// Returns the key specification string for a `GameKey`.
pub fn to_spec(key: GameKey) -> String {
    key.name().to_string()
}

impl GameKey {
    /// Parses a key specification string into a `GameKey`.
    ///
    /// Accepts canonical names in any case (`Dodge`, `SWITCH_NEXT`) and the
    /// aliases `attack`, `special`, `ult`, `dash`, `next`, `prev`, the WASD
    /// letters and a few default keyboard bindings. Returns `None` if no
    /// mapping matches.
    pub fn from_spec(s: &str) -> Option<Self> {
        from_spec(s)
    }

    /// Returns the canonical spec string for this key.
    pub fn to_spec(self) -> String {
        to_spec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(k: GameKey) {
        let spec = to_spec(k);
        assert_eq!(from_spec(&spec), Some(k), "roundtrip failed for {}", spec);
    }

    #[test]
    fn every_key_roundtrips() {
        for k in GameKey::ALL {
            assert_roundtrip(*k);
        }
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(from_spec("Dodge"), Some(GameKey::Dodge));
        assert_eq!(from_spec("SWITCH_NEXT"), Some(GameKey::SwitchNext));
        assert_eq!(from_spec("  chain_left "), Some(GameKey::ChainLeft));
    }

    #[test]
    fn aliases() {
        assert_eq!(from_spec("attack"), Some(GameKey::NormalAttack));
        assert_eq!(from_spec("ULT"), Some(GameKey::Ultimate));
        assert_eq!(from_spec("dash"), Some(GameKey::Dodge));
        assert_eq!(from_spec("w"), Some(GameKey::MoveForward));
        assert_eq!(from_spec("next"), Some(GameKey::SwitchNext));
        // aliases are never emitted
        assert_eq!(GameKey::Dodge.to_spec(), "dodge");
    }

    #[test]
    fn unknown_spec() {
        assert_eq!(from_spec("jump"), None);
        assert_eq!(from_spec(""), None);
    }

    #[test]
    fn display_matches_spec() {
        assert_eq!(GameKey::SpecialAttack.to_string(), "special_attack");
    }
}
