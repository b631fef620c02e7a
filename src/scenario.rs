//! Catalog of training scenarios a caller can be dropped into

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        key: "institution_impersonation",
        name: "Institution Impersonation",
        description: "The user receives a call impersonating a trusted institution.",
    },
    Scenario {
        key: "loan_scam",
        name: "Loan Scam",
        description: "The user is targeted with a loan scam call.",
    },
    Scenario {
        key: "delivery_notification",
        name: "Delivery Notification",
        description: "The user receives a fake delivery notification call.",
    },
    Scenario {
        key: "friends_impersonation",
        name: "Friends Impersonation",
        description: "The user receives a call impersonating a friend in need.",
    },
];

pub fn lookup(key: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == key)
}

pub fn all() -> &'static [Scenario] {
    SCENARIOS
}
