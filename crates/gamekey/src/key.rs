use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares `GameKey` together with its canonical spec names.
macro_rules! game_keys {
    ( $( $(#[$doc:meta])* $variant:ident => $spec:literal, )* ) => {
        /// A logical game input.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum GameKey {
            $( $(#[$doc])* $variant, )*
        }

        impl GameKey {
            /// All keys in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )* ];

            /// Canonical spec name of this key.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $spec, )*
                }
            }

            /// Case-insensitive lookup by canonical spec name.
            pub fn from_name(s: &str) -> Option<Self> {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $( $spec => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

game_keys! {
    /// Basic attack.
    NormalAttack => "normal_attack",
    /// Special/EX attack.
    SpecialAttack => "special_attack",
    /// Ultimate.
    Ultimate => "ultimate",
    /// Dodge / dash.
    Dodge => "dodge",
    /// Switch to the next team member.
    SwitchNext => "switch_next",
    /// Switch to the previous team member.
    SwitchPrev => "switch_prev",
    /// Chain attack, left choice.
    ChainLeft => "chain_left",
    /// Chain attack, right choice.
    ChainRight => "chain_right",
    /// Forward movement.
    MoveForward => "move_forward",
    /// Backward movement.
    MoveBack => "move_back",
    /// Strafe left.
    MoveLeft => "move_left",
    /// Strafe right.
    MoveRight => "move_right",
    /// Interact with the world.
    Interact => "interact",
    /// Lock on target.
    Lock => "lock",
    /// Open the in-game menu.
    Menu => "menu",
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
