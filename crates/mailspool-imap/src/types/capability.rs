//! Advertised server capabilities relevant to this engine.

/// Authentication mechanisms as a bit set.
///
/// The same type doubles as the permission mask an observer hands
/// back: the engine only uses mechanisms that are both advertised by
/// the server and permitted by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthMethods(u32);

impl AuthMethods {
    /// No mechanism.
    pub const NONE: Self = Self(0);
    /// Plain LOGIN command.
    pub const LOGIN: Self = Self(0x01);
    /// AUTHENTICATE CRAM-MD5 challenge/response.
    pub const CRAM_MD5: Self = Self(0x02);
    /// Every supported mechanism.
    pub const ALL: Self = Self(0x03);

    /// Whether every mechanism in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no mechanism is present.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for AuthMethods {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for AuthMethods {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// What the server advertised in its last CAPABILITY response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    auth: AuthMethods,
    namespace: bool,
    starttls: bool,
}

impl Capabilities {
    /// Interprets the atoms of a CAPABILITY response.
    ///
    /// Unknown capabilities are ignored; a LOGINDISABLED announcement
    /// removes LOGIN from the advertised mechanisms.
    #[must_use]
    pub fn parse<S: AsRef<str>>(atoms: &[S]) -> Self {
        let mut caps = Self {
            // LOGIN needs no announcement, only the absence of
            // LOGINDISABLED.
            auth: AuthMethods::LOGIN,
            ..Self::default()
        };
        let mut login_disabled = false;
        for atom in atoms {
            match atom.as_ref().to_uppercase().as_str() {
                "AUTH=CRAM-MD5" => caps.auth = caps.auth | AuthMethods::CRAM_MD5,
                "NAMESPACE" => caps.namespace = true,
                "STARTTLS" => caps.starttls = true,
                "LOGINDISABLED" => login_disabled = true,
                _ => {}
            }
        }
        if login_disabled {
            caps.auth = caps.auth & AuthMethods::CRAM_MD5;
        }
        caps
    }

    /// Mechanisms the server accepts.
    #[must_use]
    pub const fn auth(self) -> AuthMethods {
        self.auth
    }

    /// Whether the NAMESPACE command may be issued.
    #[must_use]
    pub const fn has_namespace(self) -> bool {
        self.namespace
    }

    /// Whether the server offers a STARTTLS upgrade.
    #[must_use]
    pub const fn has_starttls(self) -> bool {
        self.starttls
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    mod auth_methods_tests {
        use super::*;

        #[test]
        fn contains_subset() {
            assert!(AuthMethods::ALL.contains(AuthMethods::LOGIN));
            assert!(AuthMethods::ALL.contains(AuthMethods::CRAM_MD5));
            assert!(!AuthMethods::LOGIN.contains(AuthMethods::CRAM_MD5));
        }

        #[test]
        fn bitor_unions() {
            let both = AuthMethods::LOGIN | AuthMethods::CRAM_MD5;
            assert_eq!(both, AuthMethods::ALL);
        }

        #[test]
        fn bitand_intersects() {
            let only = AuthMethods::ALL & AuthMethods::CRAM_MD5;
            assert!(only.contains(AuthMethods::CRAM_MD5));
            assert!(!only.contains(AuthMethods::LOGIN));
        }
    }

    mod capabilities_tests {
        use super::*;

        #[test]
        fn login_assumed_without_announcement() {
            let caps = Capabilities::parse(&["IMAP4REV1"]);
            assert!(caps.auth().contains(AuthMethods::LOGIN));
            assert!(!caps.auth().contains(AuthMethods::CRAM_MD5));
        }

        #[test]
        fn cram_md5_requires_announcement() {
            let caps = Capabilities::parse(&["IMAP4REV1", "AUTH=CRAM-MD5"]);
            assert!(caps.auth().contains(AuthMethods::CRAM_MD5));
        }

        #[test]
        fn parse_is_case_insensitive() {
            let caps = Capabilities::parse(&["auth=cram-md5", "namespace", "starttls"]);
            assert!(caps.auth().contains(AuthMethods::CRAM_MD5));
            assert!(caps.has_namespace());
            assert!(caps.has_starttls());
        }

        #[test]
        fn login_disabled_removes_login() {
            let caps = Capabilities::parse(&["LOGINDISABLED", "AUTH=CRAM-MD5"]);
            assert!(!caps.auth().contains(AuthMethods::LOGIN));
            assert!(caps.auth().contains(AuthMethods::CRAM_MD5));
        }

        #[test]
        fn unknown_atoms_are_ignored() {
            let caps = Capabilities::parse(&["XSOMETHING", "UIDPLUS"]);
            assert!(!caps.has_namespace());
            assert!(!caps.has_starttls());
        }
    }
}
