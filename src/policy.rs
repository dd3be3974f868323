//! Who may do what.
//!
//! [`can_access`] is a pure decision: it neither reads storage nor logs.
//! Callers load the records involved, ask, and audit after a successful
//! mutation.

use crate::{
    db::{Message, Room, User},
    error::{ChatError, ChatResult},
};

/// The authenticated identity behind an operation, plus where it came from.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: User,
    pub ip: String,
}

impl Caller {
    pub fn new(user: User, ip: impl Into<String>) -> Self {
        Self { user, ip: ip.into() }
    }

    pub fn can(&self, resource: Resource<'_>, action: Action) -> bool {
        can_access(Some(&self.user), resource, action)
    }

    pub fn require(&self, resource: Resource<'_>, action: Action) -> ChatResult<()> {
        if self.can(resource, action) {
            Ok(())
        } else {
            Err(ChatError::Unauthorized)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Room(&'a Room),
    /// The room directory itself, for rooms that don't exist yet.
    Rooms,
    Message(&'a Message),
    /// A message that is about to be written.
    NewMessage,
    User(&'a User),
    /// The user directory, for accounts that don't exist yet.
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Join,
    Create,
    Update,
    Delete,
    ManageMembers,
    AttachFile,
    Ban,
    Unban,
}

/// Rules are checked top to bottom, the first that applies decides.
pub fn can_access(actor: Option<&User>, resource: Resource<'_>, action: Action) -> bool {
    let Some(actor) = actor else {
        // anonymous callers may only learn that a public room exists
        return matches!(
            (resource, action),
            (Resource::Room(room), Action::Read) if !room.is_private
        );
    };

    if actor.is_admin() {
        return true;
    }

    let perms = &actor.permissions;
    match (resource, action) {
        (Resource::Room(room), Action::Read | Action::Join) => {
            !room.is_private || room.is_member(actor.id)
        }
        (Resource::Message(message), Action::Delete) => {
            message.sender_id == actor.id || perms.can_delete_messages
        }
        (Resource::Rooms, Action::Create) => perms.can_create_room,
        (Resource::Message(_) | Resource::NewMessage, Action::AttachFile) => perms.can_upload_files,
        (Resource::User(target), Action::Ban | Action::Unban) => {
            perms.can_ban_users && !target.is_admin()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use super::*;
    use crate::db::{Permissions, Role, now};

    fn user(role: Role, permissions: Permissions) -> User {
        User {
            id: Uuid::now_v7(),
            username: format!("user-{}", Uuid::now_v7().simple()),
            password_hash: String::new(),
            role,
            permissions,
            active: true,
            banned: false,
            banned_until: None,
            created_at: now(),
            last_login: None,
        }
    }

    fn client() -> User {
        user(Role::Client, Permissions::default())
    }

    fn room(is_private: bool, members: &[Uuid]) -> Room {
        Room {
            id: Uuid::now_v7(),
            name: "general".to_owned(),
            description: String::new(),
            created_by: Uuid::now_v7(),
            created_at: now(),
            is_private,
            allowed_users: members.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn message(sender_id: Uuid) -> Message {
        Message {
            id: 1,
            room_id: Uuid::now_v7(),
            sender_id,
            sender_name: None,
            content: "hi".to_owned(),
            timestamp: now(),
            has_attachment: false,
            attachment_url: None,
        }
    }

    const ALL_ACTIONS: [Action; 9] = [
        Action::Read,
        Action::Join,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::ManageMembers,
        Action::AttachFile,
        Action::Ban,
        Action::Unban,
    ];

    #[test]
    fn admin_is_allowed_everything_without_flags() {
        let admin = user(Role::Admin, Permissions::default());
        let other_admin = user(Role::Admin, Permissions::default());
        let private = room(true, &[]);
        let msg = message(Uuid::now_v7());

        let resources = [
            Resource::Room(&private),
            Resource::Rooms,
            Resource::Message(&msg),
            Resource::NewMessage,
            Resource::User(&other_admin),
            Resource::Users,
        ];
        for resource in resources {
            for action in ALL_ACTIONS {
                assert!(can_access(Some(&admin), resource, action), "{resource:?} {action:?}");
            }
        }
    }

    #[test]
    fn anonymous_sees_only_public_room_existence() {
        let public = room(false, &[]);
        let private = room(true, &[]);

        assert!(can_access(None, Resource::Room(&public), Action::Read));
        assert!(!can_access(None, Resource::Room(&public), Action::Join));
        assert!(!can_access(None, Resource::Room(&private), Action::Read));
        assert!(!can_access(None, Resource::Rooms, Action::Create));
    }

    #[test]
    fn private_rooms_need_membership() {
        let member = client();
        let outsider = client();
        let private = room(true, &[member.id]);
        let public = room(false, &[]);

        for action in [Action::Read, Action::Join] {
            assert!(can_access(Some(&member), Resource::Room(&private), action));
            assert!(!can_access(Some(&outsider), Resource::Room(&private), action));
            assert!(can_access(Some(&outsider), Resource::Room(&public), action));
        }
    }

    #[test]
    fn sender_or_moderator_may_delete_message() {
        let sender = client();
        let stranger = client();
        let moderator = user(
            Role::Client,
            Permissions {
                can_delete_messages: true,
                ..Default::default()
            },
        );
        let msg = message(sender.id);

        assert!(can_access(Some(&sender), Resource::Message(&msg), Action::Delete));
        assert!(can_access(Some(&moderator), Resource::Message(&msg), Action::Delete));
        assert!(!can_access(Some(&stranger), Resource::Message(&msg), Action::Delete));
    }

    #[test]
    fn flags_gate_room_creation_and_attachments() {
        let plain = client();
        let creator = user(
            Role::Client,
            Permissions {
                can_create_room: true,
                ..Default::default()
            },
        );
        let uploader = user(
            Role::Client,
            Permissions {
                can_upload_files: true,
                ..Default::default()
            },
        );

        assert!(!can_access(Some(&plain), Resource::Rooms, Action::Create));
        assert!(can_access(Some(&creator), Resource::Rooms, Action::Create));
        assert!(!can_access(Some(&plain), Resource::NewMessage, Action::AttachFile));
        assert!(can_access(Some(&uploader), Resource::NewMessage, Action::AttachFile));
        assert!(!can_access(Some(&creator), Resource::NewMessage, Action::AttachFile));
    }

    #[test]
    fn banning_needs_flag_and_non_admin_target() {
        let banner = user(
            Role::Client,
            Permissions {
                can_ban_users: true,
                ..Default::default()
            },
        );
        let target = client();
        let admin = user(Role::Admin, Permissions::default());

        assert!(can_access(Some(&banner), Resource::User(&target), Action::Ban));
        assert!(!can_access(Some(&banner), Resource::User(&admin), Action::Ban));
        assert!(!can_access(Some(&client()), Resource::User(&target), Action::Ban));
    }

    #[test]
    fn room_management_defaults_to_deny() {
        let everything = user(Role::Client, Permissions::all());
        let mine = room(true, &[everything.id]);

        for action in [Action::Update, Action::Delete, Action::ManageMembers] {
            assert!(!can_access(Some(&everything), Resource::Room(&mine), action));
        }
        assert!(!can_access(Some(&everything), Resource::User(&client()), Action::Update));
        assert!(!can_access(Some(&everything), Resource::Users, Action::Create));
    }

    #[test]
    fn caller_require_reports_unauthorized() {
        let caller = Caller::new(client(), "127.0.0.1");
        assert!(matches!(
            caller.require(Resource::Rooms, Action::Create),
            Err(ChatError::Unauthorized)
        ));
        assert!(caller.require(Resource::Room(&room(false, &[])), Action::Join).is_ok());
    }
}
