//! service::profiles
//!
//! Identity store operations: resolving and upserting git profiles.
//!
//! Resolution is an explicit two-level lookup: the per-application profile
//! wins unless absent or marked to defer, then the user's global profile;
//! with neither configured, operations needing an identity fail rather
//! than committing with an empty one.

use std::collections::HashMap;

use crate::core::types::{ApplicationId, UserId};
use crate::error::SyncError;
use crate::store::GitProfile;

use super::GitSyncService;

impl GitSyncService {
    /// Resolve the commit identity for a user.
    ///
    /// With `application` given, the per-application profile is preferred;
    /// a profile marked `use_global_profile` is treated as absent.
    ///
    /// # Errors
    ///
    /// - [`SyncError::ProfileNotConfigured`] when neither a scoped nor a
    ///   global profile exists
    pub async fn resolve_profile(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
    ) -> Result<GitProfile, SyncError> {
        if let Some(application) = application {
            if let Some(profile) = self.store.profile(user, Some(application)).await? {
                if !profile.use_global_profile {
                    return Ok(profile);
                }
            }
        }

        self.store
            .profile(user, None)
            .await?
            .ok_or_else(|| SyncError::ProfileNotConfigured(user.to_string()))
    }

    /// Create or update a git profile.
    ///
    /// Idempotent. With `application` given the profile is scoped to that
    /// application; `is_default` additionally promotes it to the user's
    /// global fallback. Returns the user's full profile map keyed by
    /// [`crate::store::GLOBAL_PROFILE_KEY`] and application ids.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidState`] when author name or email is empty and
    ///   the profile does not defer to the global one
    pub async fn upsert_profile(
        &self,
        user: &UserId,
        profile: GitProfile,
        is_default: bool,
        application: Option<&ApplicationId>,
    ) -> Result<HashMap<String, GitProfile>, SyncError> {
        if !profile.use_global_profile
            && (profile.author_name.trim().is_empty() || profile.author_email.trim().is_empty())
        {
            return Err(SyncError::InvalidState(
                "git profile requires a non-empty author name and email".into(),
            ));
        }

        match application {
            Some(application) => {
                self.store
                    .put_profile(user, Some(application), profile.clone())
                    .await?;
                if is_default {
                    self.store
                        .put_profile(
                            user,
                            None,
                            GitProfile {
                                use_global_profile: false,
                                ..profile
                            },
                        )
                        .await?;
                }
            }
            None => {
                self.store.put_profile(user, None, profile).await?;
            }
        }

        Ok(self.store.profiles(user).await?)
    }
}
