// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Access credential passed through to the registration service.

#![allow(unused_assignments)] // Fields are used in methods, false positive from nightly

use std::fmt::Debug;

use ustr::Ustr;
use zeroize::ZeroizeOnDrop;

use super::enums::TokenType;

/// An already-validated access token with its identity claims.
///
/// The token is zeroized on drop and never printed.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Credential {
    #[zeroize(skip)]
    token_type: TokenType,
    access_token: String,
    #[zeroize(skip)]
    client_id: Ustr,
    #[zeroize(skip)]
    user_id: Option<Ustr>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Credential {
    /// Creates a new [`Credential`] instance.
    #[must_use]
    pub fn new(
        token_type: TokenType,
        access_token: impl Into<String>,
        client_id: impl AsRef<str>,
    ) -> Self {
        Self {
            token_type,
            access_token: access_token.into(),
            client_id: Ustr::from(client_id.as_ref()),
            user_id: None,
        }
    }

    /// Creates a user access [`Credential`] for `user_id`.
    #[must_use]
    pub fn user(
        access_token: impl Into<String>,
        client_id: impl AsRef<str>,
        user_id: impl AsRef<str>,
    ) -> Self {
        Self::new(TokenType::User, access_token, client_id).with_user_id(user_id)
    }

    /// Creates an app access [`Credential`].
    #[must_use]
    pub fn app(access_token: impl Into<String>, client_id: impl AsRef<str>) -> Self {
        Self::new(TokenType::App, access_token, client_id)
    }

    /// Sets the user identity claim.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl AsRef<str>) -> Self {
        self.user_id = Some(Ustr::from(user_id.as_ref()));
        self
    }

    #[must_use]
    pub const fn token_type(&self) -> TokenType {
        self.token_type
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub const fn client_id(&self) -> &Ustr {
        &self.client_id
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<&Ustr> {
        self.user_id.as_ref()
    }

    /// Returns true if no access token is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.trim().is_empty()
    }

    /// Returns the value for an `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_debug_redacts_access_token() {
        let credential = Credential::user("secret-token", "client-1", "1234");
        let debug = format!("{credential:?}");

        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("client-1"));
    }

    #[rstest]
    fn test_user_and_app_constructors() {
        let user = Credential::user("token", "client", "42");
        assert_eq!(user.token_type(), TokenType::User);
        assert_eq!(user.user_id().map(Ustr::as_str), Some("42"));

        let app = Credential::app("token", "client");
        assert_eq!(app.token_type(), TokenType::App);
        assert!(app.user_id().is_none());
    }

    #[rstest]
    #[case("", true)]
    #[case("   ", true)]
    #[case("abc", false)]
    fn test_is_empty(#[case] token: &str, #[case] expected: bool) {
        let credential = Credential::user(token, "client", "42");
        assert_eq!(credential.is_empty(), expected);
    }

    #[rstest]
    fn test_bearer_header() {
        let credential = Credential::user("abc", "client", "42");
        assert_eq!(credential.bearer(), "Bearer abc");
    }
}
