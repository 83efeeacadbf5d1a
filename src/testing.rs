//! In-memory stand-ins for the blob, record and user stores.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use axum::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::auth::repo::{UserStore, UserWriteError};
use crate::auth::repo_types::{NewUser, ProfileChanges, UpdatedUser, User};
use crate::foods::repo::FoodRecordStore;
use crate::foods::repo_types::{FoodChanges, FoodEntry, FoodFilter, NewFood, UpdatedFood};
use crate::storage::StorageClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Put(String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<StorageCall>>,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryStorage {
    pub fn fail_puts(&self) {
        self.fail_put.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(StorageCall::Put(key.to_string()));
        if self.fail_put.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StorageCall::Delete(key.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://fake.local/food-images/{}", key)
    }
}

#[derive(Default)]
pub struct MemoryFoodStore {
    rows: Mutex<Vec<FoodEntry>>,
    inserts: AtomicUsize,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
    hold_insert: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl MemoryFoodStore {
    pub fn fail_inserts(&self) {
        self.fail_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    /// Makes the next inserts park until [`Self::release_inserts`].
    pub fn hold_inserts(&self) {
        self.hold_insert.store(true, Ordering::SeqCst);
    }

    pub fn release_inserts(&self) {
        self.hold_insert.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }

    pub async fn wait_for_insert(&self) {
        self.entered.notified().await;
    }

    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<FoodEntry> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl FoodRecordStore for MemoryFoodStore {
    async fn insert(&self, row: NewFood) -> anyhow::Result<FoodEntry> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.hold_insert.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        if self.fail_insert.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        let (image_path, image_url) = match row.image {
            Some(img) => (Some(img.path), Some(img.url)),
            None => (None, None),
        };
        let entry = FoodEntry {
            id: Uuid::new_v4(),
            user_id: row.owner_id,
            name: row.name,
            meal: row.meal,
            date: row.date,
            image_path,
            image_url,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, owner_id: Uuid, filter: &FoodFilter) -> anyhow::Result<Vec<FoodEntry>> {
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut rows: Vec<FoodEntry> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == owner_id)
            .filter(|r| needle.as_ref().map_or(true, |n| r.name.to_lowercase().contains(n)))
            .filter(|r| filter.date.map_or(true, |d| r.date == d))
            .filter(|r| filter.meal.map_or(true, |m| r.meal == m.as_str()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.user_id == owner_id)
            .cloned())
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: FoodChanges,
    ) -> anyhow::Result<Option<UpdatedFood>> {
        if self.fail_update.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id && r.user_id == owner_id) else {
            return Ok(None);
        };
        let previous_image = row.image_path.clone();
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(meal) = changes.meal {
            row.meal = meal.as_str().to_string();
        }
        if let Some(date) = changes.date {
            row.date = date;
        }
        if let Some(image) = changes.image {
            row.image_path = Some(image.path);
            row.image_url = Some(image.url);
        }
        Ok(Some(UpdatedFood {
            entry: row.clone(),
            previous_image,
        }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(pos) = rows.iter().position(|r| r.id == id && r.user_id == owner_id) else {
            return Ok(None);
        };
        Ok(Some(rows.remove(pos)))
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
    fail_update: AtomicBool,
}

impl MemoryUserStore {
    pub fn fail_updates(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn create(&self, new: NewUser) -> Result<User, UserWriteError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new.email) {
            return Err(UserWriteError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            gender: new.gender,
            avatar_path: None,
            avatar_url: None,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<UpdatedUser>, UserWriteError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("database unavailable").into());
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(email) = &changes.email {
            if rows.iter().any(|u| u.id != id && &u.email == email) {
                return Err(UserWriteError::EmailTaken);
            }
        }
        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        let previous_avatar = user.avatar_path.clone();
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(gender) = changes.gender {
            user.gender = Some(gender);
        }
        if let Some(avatar) = changes.avatar {
            user.avatar_path = Some(avatar.path);
            user.avatar_url = Some(avatar.url);
        }
        Ok(Some(UpdatedUser {
            user: user.clone(),
            previous_avatar,
        }))
    }
}
