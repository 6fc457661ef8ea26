// A session translates what the operator wants into AT commands and what the
// device says back into `DeviceState`. Queries are lazy: the first call goes to the
// wire, later calls are served from the cache. Each query has a `refresh_` twin
// which always goes to the wire. Setters always go to the wire and update the cache
// only once the device has accepted the change.

use crate::command::Command;
use crate::config::RetryPolicy;
use crate::parse;
use crate::state::{
    Channel, ChannelTable, Class, CommandCatalog, DeviceState, JoinMode, LoraStatus, Sensor,
    Switch, WorkMode,
};
use crate::transport::Transport;
use crate::{Error, Result};
use log::{debug, info, warn};
use std::thread;

pub struct Session<T> {
    transport: T,
    state: DeviceState,
    channel_retry: RetryPolicy,
}

fn wire_flag(on: bool) -> u8 {
    if on {
        1
    } else {
        0
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: DeviceState::default(),
            channel_retry: RetryPolicy::default(),
        }
    }

    pub fn with_channel_retry(mut self, policy: RetryPolicy) -> Self {
        self.channel_retry = policy;
        self
    }

    /// The cache as it stands, without touching the device.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn execute(&mut self, command: Command) -> Result<Vec<String>> {
        self.transport.execute(&command)
    }

    pub fn version(&mut self) -> Result<&str> {
        if self.state.version.is_none() {
            self.refresh_version()?;
        }
        Ok(self.state.version.as_deref().unwrap_or_default())
    }

    pub fn refresh_version(&mut self) -> Result<&str> {
        let lines = self.execute(Command::new("version"))?;
        let version = lines.into_iter().next().unwrap_or_default();
        debug!("firmware version {}", version);
        Ok(self.state.version.insert(version).as_str())
    }

    pub fn lora_status(&mut self) -> Result<&LoraStatus> {
        if !self.state.lora_loaded {
            self.refresh_lora_status()?;
        }
        Ok(&self.state.lora)
    }

    pub fn refresh_lora_status(&mut self) -> Result<&LoraStatus> {
        let lines = self.execute(Command::get_config("lora:status"))?;
        for line in &lines {
            if !parse::apply_status_line(&mut self.state.lora, line) {
                debug!("ignoring status line '{}'", line);
            }
        }
        self.state.lora_loaded = true;
        Ok(&self.state.lora)
    }

    pub fn channels(&mut self) -> Result<&ChannelTable> {
        if self.state.channels.is_none() {
            self.refresh_channels()?;
        }
        Ok(&*self.state.channels.get_or_insert_with(ChannelTable::new))
    }

    /// Query the channel plan, retrying a bounded number of times while the
    /// device answers with nothing or with channels that are still coming up.
    pub fn refresh_channels(&mut self) -> Result<&ChannelTable> {
        let attempts = self.channel_retry.attempts.max(1);
        let mut attempt = 1;
        let table = loop {
            let result = self
                .execute(Command::get_config("lora:channel"))
                .and_then(|lines| match parse::parse_channels(&lines) {
                    Ok(table) if table.is_empty() => {
                        Err(Error::NoResponse(Command::get_config("lora:channel").to_string()))
                    }
                    other => other,
                });
            match result {
                Ok(table) => break table,
                Err(err @ (Error::NoResponse(_) | Error::NotReady(_))) if attempt < attempts => {
                    warn!("channel query attempt {}/{} failed: {}", attempt, attempts, err);
                    attempt += 1;
                    thread::sleep(self.channel_retry.delay);
                }
                Err(err) => return Err(err),
            }
        };
        Ok(&*self.state.channels.insert(table))
    }

    pub fn command_catalog(&mut self) -> Result<&CommandCatalog> {
        if self.state.catalog.is_none() {
            self.refresh_command_catalog()?;
        }
        Ok(&*self.state.catalog.get_or_insert_with(CommandCatalog::new))
    }

    pub fn refresh_command_catalog(&mut self) -> Result<&CommandCatalog> {
        let lines = self.execute(Command::new("help"))?;
        Ok(&*self.state.catalog.insert(parse::parse_help(&lines)))
    }

    pub fn device_status(&mut self) -> Result<&[String]> {
        if self.state.device_status.is_none() {
            self.refresh_device_status()?;
        }
        Ok(self.state.device_status.as_deref().unwrap_or_default())
    }

    pub fn refresh_device_status(&mut self) -> Result<&[String]> {
        let lines = self.execute(Command::get_config("device:status"))?;
        Ok(self.state.device_status.insert(lines).as_slice())
    }

    /// Run an arbitrary command after checking it against the device's own
    /// `help` listing.
    pub fn run<S: AsRef<str>>(&mut self, name: &str, args: &[S]) -> Result<Vec<String>> {
        let expected = match self.command_catalog()?.get(name) {
            Some(&expected) => expected,
            None => return Err(Error::UnknownCommand(name.to_string())),
        };
        if expected != args.len() {
            return Err(Error::ArgumentCount(name.to_string(), expected, args.len()));
        }
        self.execute(Command::from_name(name, args))
    }

    fn set(&mut self, command: Command) -> Result<()> {
        self.execute(command).map(|_| ())
    }

    pub fn set_work_mode(&mut self, mode: WorkMode) -> Result<()> {
        self.set(Command::set_config("lora:work_mode").arg(mode.wire_code()))?;
        self.state.lora.work_mode = Some(mode);
        info!("work mode set to {}", mode);
        Ok(())
    }

    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.set(Command::set_config("lora:region").arg(region))?;
        self.state.lora.region = Some(region.to_string());
        info!("region set to {}", region);
        Ok(())
    }

    pub fn set_class(&mut self, class: Class) -> Result<()> {
        self.set(Command::set_config("lora:class").arg(class.wire_code()))?;
        self.state.lora.class = Some(class);
        info!("class set to {}", class);
        Ok(())
    }

    pub fn set_join_mode(&mut self, mode: JoinMode) -> Result<()> {
        self.set(Command::set_config("lora:join_mode").arg(mode.wire_code()))?;
        self.state.lora.join_mode = Some(mode);
        info!("join mode set to {}", mode);
        Ok(())
    }

    pub fn set_adr(&mut self, enabled: bool) -> Result<()> {
        self.set(Command::set_config("lora:adr").arg(wire_flag(enabled)))?;
        self.state.lora.adr = Some(enabled);
        info!("ADR set to {}", enabled);
        Ok(())
    }

    pub fn set_confirm(&mut self, confirm: bool) -> Result<()> {
        self.set(Command::set_config("lora:confirm").arg(wire_flag(confirm)))?;
        self.state.lora.confirm = Some(confirm);
        info!("confirmed uplinks set to {}", confirm);
        Ok(())
    }

    /// `eui` must already be 16 upper-case hex characters.
    pub fn set_dev_eui(&mut self, eui: &str) -> Result<()> {
        self.set(Command::set_config("lora:dev_eui").arg(eui))?;
        self.state.lora.dev_eui = Some(eui.to_string());
        info!("device EUI set to {}", eui);
        Ok(())
    }

    pub fn set_app_eui(&mut self, eui: &str) -> Result<()> {
        self.set(Command::set_config("lora:app_eui").arg(eui))?;
        self.state.lora.app_eui = Some(eui.to_string());
        info!("application EUI set to {}", eui);
        Ok(())
    }

    /// `key` must already be 32 upper-case hex characters.
    pub fn set_app_key(&mut self, key: &str) -> Result<()> {
        self.set(Command::set_config("lora:app_key").arg(key))?;
        self.state.lora.app_key = Some(key.to_string());
        info!("application key set");
        Ok(())
    }

    /// `None` turns periodic uplinks off.
    pub fn set_send_interval(&mut self, seconds: Option<u32>) -> Result<()> {
        let command = Command::set_config("lora:send_interval")
            .arg(wire_flag(seconds.is_some()))
            .arg(seconds.unwrap_or(0));
        self.set(command)?;
        self.state.lora.send_interval = Some(seconds.unwrap_or(0));
        match seconds {
            Some(seconds) => info!("send interval set to {}s", seconds),
            None => info!("periodic sending disabled"),
        }
        Ok(())
    }

    pub fn set_sensor(&mut self, sensor: Sensor, on: bool) -> Result<()> {
        let path = format!("sensor:{}", sensor.wire_name());
        self.set(Command::set_config(path).arg(wire_flag(on)))?;
        self.state.sensors.set(sensor, Switch::from(on));
        info!("{} sensor turned {}", sensor, Switch::from(on));
        Ok(())
    }

    /// Mask (`mask = true`) or unmask a channel. Does nothing when the channel is
    /// already in the requested state.
    pub fn mask_channel(&mut self, channel: u8, mask: bool) -> Result<()> {
        let open = match self.channels()?.get(&channel) {
            Some(Channel { open, .. }) => *open,
            None => return Err(Error::UnknownChannel(channel)),
        };
        if open != mask {
            debug!("channel {} already {}", channel, if open { "open" } else { "masked" });
            return Ok(());
        }
        self.set(
            Command::set_config("lora:ch_mask")
                .arg(channel)
                .arg(wire_flag(!mask)),
        )?;
        if let Some(entry) = self
            .state
            .channels
            .as_mut()
            .and_then(|table| table.get_mut(&channel))
        {
            entry.open = !mask;
        }
        info!("channel {} {}", channel, if mask { "masked" } else { "unmasked" });
        Ok(())
    }

    pub fn join(&mut self) -> Result<Vec<String>> {
        self.execute(Command::new("join"))
    }

    pub fn restart(&mut self) -> Result<()> {
        self.set(Command::set_config("device:restart"))?;
        info!("device restarting");
        Ok(())
    }

    /// Reboot into the bootloader.
    pub fn boot(&mut self) -> Result<()> {
        self.set(Command::set_config("device:boot"))?;
        info!("device entering boot mode");
        Ok(())
    }
}
