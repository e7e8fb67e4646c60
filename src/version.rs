use derive_more::Display;

/// Ordinal Inno Setup release number.
///
/// Only used to decide which fields are present in a given setup loader
/// layout, so the revision component carried by full version strings is
/// irrelevant here.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
#[display("{_0}.{_1}.{_2}")]
pub struct InnoVersion(pub u8, pub u8, pub u8);

impl InnoVersion {
    /// The most permissive ordinal, assumed when a loader signature is
    /// not in the known table so that every optional field is decoded
    /// with the newest layout.
    pub const MAX: Self = Self(u8::MAX, u8::MAX, u8::MAX);
}

#[cfg(test)]
mod tests {
    use super::InnoVersion;

    #[test]
    fn ordering() {
        assert!(InnoVersion(4, 0, 3) < InnoVersion(4, 0, 10));
        assert!(InnoVersion(4, 1, 6) > InnoVersion(4, 0, 10));
        assert!(InnoVersion(5, 1, 5) > InnoVersion(4, 1, 6));
        assert!(InnoVersion::MAX > InnoVersion(5, 1, 5));
        assert_eq!(InnoVersion(1, 2, 10), InnoVersion(1, 2, 10));
    }

    #[test]
    fn display() {
        assert_eq!(InnoVersion(5, 1, 5).to_string(), "5.1.5");
    }
}
