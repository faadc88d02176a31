use std::time::{Duration, SystemTime};

use claimgate::session::JwtSessions;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn test_sessions() -> JwtSessions {
    JwtSessions::new(TEST_SECRET, Duration::from_secs(3600)).expect("Failed to build sessions")
}

/// Builder for signed session tokens
pub struct SessionBuilder {
    uid: String,
    role: String,
    expires: SystemTime,
}

impl SessionBuilder {
    pub fn new(uid: &str, role: &str) -> Self {
        Self {
            uid: uid.to_string(),
            role: role.to_string(),
            expires: SystemTime::now() + Duration::from_secs(3600),
        }
    }

    pub fn administrator(uid: &str) -> Self {
        Self::new(uid, "administrator")
    }

    pub fn assessment_lead(uid: &str) -> Self {
        Self::new(uid, "assessment_lead")
    }

    pub fn enumerator(uid: &str) -> Self {
        Self::new(uid, "enumerator")
    }

    pub fn expired(mut self) -> Self {
        self.expires = SystemTime::now() - Duration::from_secs(60);
        self
    }

    pub fn token(self) -> String {
        test_sessions()
            .issue_until(&self.uid, &self.role, self.expires)
            .expect("Failed to sign test token")
    }
}
