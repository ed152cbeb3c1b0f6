use std::net::SocketAddr;

use rustc_hash::FxHashMap;

use crate::chat::image_store::ImageHandle;

/// id of the placeholder user for anything that can not be attributed
pub const UNKNOWN_USER_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Color {
        Color { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    /// chosen by the peer itself, stable across reconnects
    pub user_id: u64,
    /// assigned by the transport, valid only while connected
    pub network_id: Option<u64>,
    /// unix seconds
    pub last_activity: i64,
    pub connected: bool,
    pub address: Option<SocketAddr>,
    pub color: Color,
    /// key of the avatar's large object
    pub icon_key: Option<String>,
    pub icon: Option<ImageHandle>,
}

impl User {
    pub fn new(user_id: u64, name: impl Into<String>) -> User {
        User {
            name: name.into(),
            user_id,
            network_id: None,
            last_activity: 0,
            connected: false,
            address: None,
            color: Color::WHITE,
            icon_key: None,
            icon: None,
        }
    }
}

/// All users this peer knows about, keyed by their stable id
pub struct UserDirectory {
    users: FxHashMap<u64, User>,
}

impl UserDirectory {
    pub fn new() -> UserDirectory {
        let mut users = FxHashMap::default();
        users.insert(UNKNOWN_USER_ID, User::new(UNKNOWN_USER_ID, "Unknown User"));
        UserDirectory { users }
    }

    pub fn get(&self, user_id: u64) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: u64) -> Option<&mut User> {
        self.users.get_mut(&user_id)
    }

    pub fn get_or_create(&mut self, user_id: u64) -> &mut User {
        self.users.entry(user_id)
            .or_insert_with(|| User::new(user_id, "User"))
    }

    pub fn get_by_network_id(&mut self, network_id: u64) -> Option<&mut User> {
        self.users.values_mut()
            .find(|u| u.network_id == Some(network_id))
    }

    /// every known user except the placeholder, ordered by id
    pub fn all(&self) -> Vec<&User> {
        let mut result = self.users.values()
            .filter(|u| u.user_id != UNKNOWN_USER_ID)
            .collect::<Vec<_>>();
        result.sort_by_key(|u| u.user_id);
        result
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        UserDirectory::new()
    }
}
