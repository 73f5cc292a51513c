// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time passcodes.
//!
//! Login and password-reset OTPs live in separate cache namespaces with their
//! own trial limits, so one flow never consumes the other's budget.

use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;

/// Which OTP flow a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpFlow {
    Login,
    PasswordReset,
}

impl OtpFlow {
    /// Cache key holding the code.
    pub fn code_key(&self, account_id: u64) -> String {
        match self {
            OtpFlow::Login => format!("otp:{account_id}"),
            OtpFlow::PasswordReset => format!("otp:resetpass:{account_id}"),
        }
    }

    /// Cache key holding the trial counter.
    pub fn trials_key(&self, account_id: u64) -> String {
        match self {
            OtpFlow::Login => format!("logintrials:{account_id}"),
            OtpFlow::PasswordReset => format!("trials:resetpass:{account_id}"),
        }
    }

    /// Attempts allowed before the flow locks out.
    pub fn max_trials(&self) -> i64 {
        match self {
            OtpFlow::Login => 4,
            OtpFlow::PasswordReset => 3,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            OtpFlow::Login => "LoginOTP",
            OtpFlow::PasswordReset => "PasswordReset",
        }
    }

    /// SMS body for a code.
    pub fn message(&self, code: &str, ttl: Duration) -> String {
        let minutes = (ttl.as_secs() / 60).max(1);
        match self {
            OtpFlow::Login => format!("Login OTP is {code}. It expires in {minutes} minutes."),
            OtpFlow::PasswordReset => {
                format!("Reset password OTP is {code}. It expires in {minutes} minutes.")
            }
        }
    }
}

/// Six-digit code from the OS CSPRNG.
pub fn generate_otp() -> String {
    OsRng.gen_range(100_000..1_000_000u32).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn flows_use_separate_keys() {
        assert_eq!(OtpFlow::Login.code_key(9), "otp:9");
        assert_eq!(OtpFlow::Login.trials_key(9), "logintrials:9");
        assert_eq!(OtpFlow::PasswordReset.code_key(9), "otp:resetpass:9");
        assert_eq!(OtpFlow::PasswordReset.trials_key(9), "trials:resetpass:9");
        assert!(OtpFlow::PasswordReset.max_trials() < OtpFlow::Login.max_trials());
    }

    #[test]
    fn message_mentions_code_and_expiry() {
        let msg = OtpFlow::Login.message("123456", Duration::from_secs(600));
        assert!(msg.contains("123456"));
        assert!(msg.contains("10 minutes"));
    }
}
