//! Подсистема Publish–Subscribe (pub/sub).
//!
//! - `broker`: `PubSub`, регистрация подписок и доставка сообщений.
//! - `listener`: слушатели с идентичностью по указателю.
//! - `message`: неизменяемый конверт, получаемый слушателем.
//! - `registry` (приватный): таблица токен → подписки и выбор получателей.
//! - `subscription`: дескрипторы отписки и селекторы `unsubscribe`.

pub mod broker;
pub mod listener;
pub mod message;
mod registry;
pub mod subscription;

pub(crate) use broker::Mode;
pub use broker::{PubSub, PubSubStats};
pub use listener::Listener;
pub use message::{DeliveryOptions, EventPhase, Message};
pub use subscription::{Selector, Selectors, SubscriptionId, Unsubscribe};
