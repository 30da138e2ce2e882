//! Problem codes of the directory abstract service.
//!
//! Each directory error carries a problem drawn from a fixed, numbered
//! enumeration. The numeric values are part of the wire contract and are
//! also what the statistics records report, so every enumeration exposes
//! [`code`](SecurityProblem::code) and a reverse lookup.

use serde::{Deserialize, Serialize};

macro_rules! problem_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Returns the numeric code used on the wire.
            #[must_use]
            pub const fn code(self) -> i64 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }

            /// Looks up a problem by its numeric code.
            #[must_use]
            pub const fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Returns the ASN.1 identifier of the problem.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", self.name(), self.code())
            }
        }
    };
}

problem_enum! {
    /// Why an abandon request could not be honored.
    AbandonProblem {
        /// No operation with the given invoke ID is outstanding.
        NoSuchOperation = 1 => "noSuchOperation",
        /// The operation has progressed too far to abandon.
        TooLate = 2 => "tooLate",
        /// The operation type cannot be abandoned.
        CannotAbandon = 3 => "cannotAbandon",
    }
}

problem_enum! {
    /// Attribute-level problem reported in an attribute error.
    AttributeProblem {
        /// The attribute or value does not exist.
        NoSuchAttributeOrValue = 1 => "noSuchAttributeOrValue",
        /// A value violates the attribute syntax.
        InvalidAttributeSyntax = 2 => "invalidAttributeSyntax",
        /// The attribute type is not defined.
        UndefinedAttributeType = 3 => "undefinedAttributeType",
        /// The matching rule is inappropriate for the attribute.
        InappropriateMatching = 4 => "inappropriateMatching",
        /// A value violates a constraint.
        ConstraintViolation = 5 => "constraintViolation",
        /// The attribute or value is already present.
        AttributeOrValueAlreadyExists = 6 => "attributeOrValueAlreadyExists",
        /// A context is not permitted.
        ContextViolation = 7 => "contextViolation",
    }
}

problem_enum! {
    /// Name resolution problem reported in a name error.
    NameProblem {
        /// The named object does not exist.
        NoSuchObject = 1 => "noSuchObject",
        /// An alias was dereferenced incorrectly.
        AliasProblem = 2 => "aliasProblem",
        /// A name component has an invalid syntax.
        InvalidAttributeSyntax = 3 => "invalidAttributeSyntax",
        /// Alias dereferencing is prohibited here.
        AliasDereferencingProblem = 4 => "aliasDereferencingProblem",
    }
}

problem_enum! {
    /// Security problem reported in a security error.
    SecurityProblem {
        /// The authentication mechanism is inappropriate.
        InappropriateAuthentication = 1 => "inappropriateAuthentication",
        /// The credentials are invalid.
        InvalidCredentials = 2 => "invalidCredentials",
        /// The requester lacks access rights.
        InsufficientAccessRights = 3 => "insufficientAccessRights",
        /// A signature failed to verify.
        InvalidSignature = 4 => "invalidSignature",
        /// Protection is required.
        ProtectionRequired = 5 => "protectionRequired",
        /// No further information is given.
        NoInformation = 6 => "noInformation",
        /// The credentials are blocked.
        BlockedCredentials = 7 => "blockedCredentials",
        /// An SPKM error occurred.
        SpkmError = 9 => "spkmError",
        /// The authentication method is not supported.
        UnsupportedAuthenticationMethod = 10 => "unsupportedAuthenticationMethod",
        /// The password has expired.
        PasswordExpired = 11 => "passwordExpired",
        /// The quality of protection does not match.
        InvalidQopMatch = 12 => "invalidQOPMatch",
    }
}

problem_enum! {
    /// Service problem reported in a service error.
    ServiceProblem {
        /// The DSA is busy.
        Busy = 1 => "busy",
        /// The DSA is unavailable.
        Unavailable = 2 => "unavailable",
        /// The DSA declines to perform the operation.
        UnwillingToPerform = 3 => "unwillingToPerform",
        /// Chaining would be required.
        ChainingRequired = 4 => "chainingRequired",
        /// The DSA cannot proceed.
        UnableToProceed = 5 => "unableToProceed",
        /// A reference is invalid.
        InvalidReference = 6 => "invalidReference",
        /// The time limit was exceeded.
        TimeLimitExceeded = 7 => "timeLimitExceeded",
        /// An administrative limit was exceeded.
        AdministrativeLimitExceeded = 8 => "administrativeLimitExceeded",
        /// A chaining loop was detected.
        LoopDetected = 9 => "loopDetected",
        /// A critical extension is unavailable.
        UnavailableCriticalExtension = 10 => "unavailableCriticalExtension",
        /// The request is out of scope.
        OutOfScope = 11 => "outOfScope",
        /// The DIT is inconsistent.
        DitError = 12 => "ditError",
        /// A paged-results query reference is invalid.
        InvalidQueryReference = 13 => "invalidQueryReference",
        /// The requested service is not available.
        RequestedServiceNotAvailable = 14 => "requestedServiceNotAvailable",
        /// A matching use is unsupported.
        UnsupportedMatchingUse = 15 => "unsupportedMatchingUse",
        /// Key attributes are ambiguous.
        AmbiguousKeyAttributes = 16 => "ambiguousKeyAttributes",
        /// A SASL bind is in progress.
        SaslBindInProgress = 17 => "saslBindInProgress",
        /// Not supported by LDAP.
        NotSupportedByLdap = 18 => "notSupportedByLDAP",
    }
}

problem_enum! {
    /// Update problem reported in an update error.
    UpdateProblem {
        /// The name violates naming rules.
        NamingViolation = 1 => "namingViolation",
        /// The entry violates its object classes.
        ObjectClassViolation = 2 => "objectClassViolation",
        /// The operation is not allowed on a non-leaf entry.
        NotAllowedOnNonLeaf = 3 => "notAllowedOnNonLeaf",
        /// The operation is not allowed on an RDN attribute.
        NotAllowedOnRdn = 4 => "notAllowedOnRDN",
        /// The entry already exists.
        EntryAlreadyExists = 5 => "entryAlreadyExists",
        /// The update would affect multiple DSAs.
        AffectsMultipleDsas = 6 => "affectsMultipleDSAs",
        /// Structural object class modification is prohibited.
        ObjectClassModificationProhibited = 7 => "objectClassModificationProhibited",
        /// The superior entry does not exist.
        NoSuchSuperior = 8 => "noSuchSuperior",
        /// The new superior is not an ancestor.
        NotAncestor = 9 => "notAncestor",
        /// The parent is not an ancestor.
        ParentNotAncestor = 10 => "parentNotAncestor",
        /// A hierarchy rule is violated.
        HierarchyRuleViolation = 11 => "hierarchyRuleViolation",
        /// A family rule is violated.
        FamilyRuleViolation = 12 => "familyRuleViolation",
        /// The password quality is insufficient.
        InsufficientPasswordQuality = 13 => "insufficientPasswordQuality",
        /// The password was used before.
        PasswordInHistory = 14 => "passwordInHistory",
        /// No password slot is available.
        NoPasswordSlot = 15 => "noPasswordSlot",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 1..=18 {
            if let Some(p) = ServiceProblem::from_code(code) {
                assert_eq!(p.code(), code);
            }
        }
        assert_eq!(SecurityProblem::NoInformation.code(), 6);
        assert_eq!(SecurityProblem::from_code(8), None);
        assert_eq!(AbandonProblem::from_code(2), Some(AbandonProblem::TooLate));
    }

    #[test]
    fn display_includes_name_and_code() {
        assert_eq!(
            SecurityProblem::NoInformation.to_string(),
            "noInformation(6)"
        );
        assert_eq!(UpdateProblem::NotAllowedOnRdn.name(), "notAllowedOnRDN");
    }
}
