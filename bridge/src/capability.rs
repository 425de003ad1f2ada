use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use irmqtt_common::{
    characteristics, AccessoryInformation, AccessoryStatus, AirConditioner, Characteristic,
    CharacteristicProps, CharacteristicValue, Command, CurrentMode, DeviceConfig, TargetMode,
    TopicSet, ValueError,
};

pub trait CommandPublisher: Send + Sync + 'static {
    /// Hands one command to the transport without waiting on the network.
    ///
    /// Commands reach the wire in the order they are enqueued. The receiver fires
    /// once the broker acknowledges delivery; `None` means the command was dropped.
    fn enqueue(&self, topic: &str, payload: &str) -> Option<oneshot::Receiver<()>>;
}

/// Host-facing handlers for one air conditioner.
///
/// A write mutates the shared record and enqueues its commands under the record's
/// lock, then waits for delivery with the lock released. A stalled acknowledgment
/// holds up only the write that issued it. Reads never touch the network.
pub struct Accessory<P> {
    name: String,
    topics: TopicSet,
    props: Vec<CharacteristicProps>,
    state: Arc<Mutex<AirConditioner>>,
    publisher: Arc<P>,
}

impl<P: CommandPublisher> Accessory<P> {
    pub fn new(
        config: &DeviceConfig,
        state: Arc<Mutex<AirConditioner>>,
        publisher: Arc<P>,
    ) -> Self {
        Self {
            name: config.display_name.clone(),
            topics: TopicSet::new(&config.mqtt.prefix),
            props: characteristics::register(config),
            state,
            publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        self.topics.prefix()
    }

    pub fn props(&self) -> &[CharacteristicProps] {
        &self.props
    }

    pub fn information(&self) -> AccessoryInformation {
        AccessoryInformation::current()
    }

    pub async fn status(&self) -> AccessoryStatus {
        self.state.lock().await.status()
    }

    pub async fn get_power(&self) -> bool {
        self.state.lock().await.power()
    }

    pub async fn get_current_mode(&self) -> CurrentMode {
        self.state.lock().await.current_mode()
    }

    pub async fn get_target_mode(&self) -> TargetMode {
        self.state.lock().await.target_mode()
    }

    pub async fn get_target_temperature(&self) -> i32 {
        self.state.lock().await.target_temperature()
    }

    pub async fn get_current_temperature(&self) -> i32 {
        self.state.lock().await.current_temperature()
    }

    pub async fn get_fan_speed(&self) -> u8 {
        self.state.lock().await.fan_speed()
    }

    pub async fn get_swing(&self) -> bool {
        self.state.lock().await.swing()
    }

    pub async fn set_power(&self, on: bool) {
        debug!("{}: set power -> {on}", self.name);
        self.write(|ac| ac.set_power(on)).await;
    }

    pub async fn set_target_mode(&self, mode: TargetMode) {
        debug!("{}: set target mode -> {}", self.name, mode.as_str());
        self.write(|ac| ac.set_target_mode(mode)).await;
    }

    pub async fn set_target_temperature(&self, value: i32) {
        debug!("{}: set target temperature -> {value}", self.name);
        self.write(|ac| ac.set_target_temperature(value)).await;
    }

    pub async fn set_fan_speed(&self, percent: u8) {
        debug!("{}: set fan speed -> {percent}%", self.name);
        self.write(|ac| ac.set_fan_speed(percent)).await;
    }

    pub async fn set_swing(&self, swing: bool) {
        debug!("{}: set swing -> {swing}", self.name);
        self.write(|ac| ac.set_swing(swing)).await;
    }

    pub async fn get(&self, characteristic: Characteristic) -> CharacteristicValue {
        match characteristic {
            Characteristic::Active => CharacteristicValue::Bool(self.get_power().await),
            Characteristic::CurrentState => {
                CharacteristicValue::CurrentMode(self.get_current_mode().await)
            }
            Characteristic::TargetState => {
                CharacteristicValue::TargetMode(self.get_target_mode().await)
            }
            Characteristic::CurrentTemperature => {
                CharacteristicValue::Int(self.get_current_temperature().await)
            }
            Characteristic::TargetTemperature => {
                CharacteristicValue::Int(self.get_target_temperature().await)
            }
            Characteristic::RotationSpeed => {
                CharacteristicValue::Int(i32::from(self.get_fan_speed().await))
            }
            Characteristic::SwingMode => CharacteristicValue::Bool(self.get_swing().await),
        }
    }

    /// Validates a host write against the registered properties and dispatches it.
    pub async fn set(
        &self,
        characteristic: Characteristic,
        value: &Value,
    ) -> Result<(), ValueError> {
        let props = self
            .props
            .iter()
            .find(|props| props.characteristic == characteristic)
            .ok_or(ValueError::ReadOnly(characteristic.as_str()))?;

        match (characteristic, props.validate(value)?) {
            (Characteristic::Active, CharacteristicValue::Bool(on)) => self.set_power(on).await,
            (Characteristic::TargetState, CharacteristicValue::TargetMode(mode)) => {
                self.set_target_mode(mode).await
            }
            (Characteristic::TargetTemperature, CharacteristicValue::Int(temp)) => {
                self.set_target_temperature(temp).await
            }
            (Characteristic::RotationSpeed, CharacteristicValue::Int(percent)) => {
                let percent = u8::try_from(percent).map_err(|_| ValueError::OutOfRange {
                    characteristic: characteristic.as_str(),
                    value: i64::from(percent),
                    min: 0,
                    max: 100,
                })?;
                self.set_fan_speed(percent).await
            }
            (Characteristic::SwingMode, CharacteristicValue::Bool(swing)) => {
                self.set_swing(swing).await
            }
            _ => return Err(ValueError::ReadOnly(characteristic.as_str())),
        }
        Ok(())
    }

    async fn write<F>(&self, apply: F)
    where
        F: FnOnce(&mut AirConditioner) -> Vec<Command>,
    {
        let deliveries: Vec<_> = {
            let mut state = self.state.lock().await;
            apply(&mut state)
                .into_iter()
                .map(|command| {
                    let topic = self.topics.command(command.attribute);
                    let delivery = self.publisher.enqueue(topic, &command.payload);
                    (topic, delivery)
                })
                .collect()
        };

        for (topic, delivery) in deliveries {
            let Some(delivery) = delivery else { continue };
            if delivery.await.is_err() {
                warn!("{}: command to '{topic}' was abandoned before delivery", self.name);
            }
        }
    }
}
