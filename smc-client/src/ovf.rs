//! Appliance bootstrap from an OVF environment document.
//!
//! Hypervisors inject an environment XML into the guest at first boot; its
//! PropertySection carries the management addressing and the SMC contact
//! details the appliance needs to configure itself and phone home.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

/// Key/value properties from the PropertySection of an OVF environment
#[derive(Debug, Clone, Default)]
pub struct OvfEnvironment {
    properties: HashMap<String, String>,
}

impl OvfEnvironment {
    /// Parse an OVF environment document
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut properties = HashMap::new();
        let mut in_properties = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) if element.local_name().as_ref() == b"PropertySection" => {
                    in_properties = true;
                }
                Ok(Event::End(element)) if element.local_name().as_ref() == b"PropertySection" => {
                    in_properties = false;
                }
                Ok(Event::Empty(element) | Event::Start(element))
                    if in_properties && element.local_name().as_ref() == b"Property" =>
                {
                    let mut key = None;
                    let mut value = None;
                    for attribute in element.attributes() {
                        let attribute =
                            attribute.context("Invalid attribute on Property element")?;
                        let text = attribute
                            .unescape_value()
                            .context("Invalid attribute value on Property element")?
                            .into_owned();
                        match attribute.key.local_name().as_ref() {
                            b"key" => key = Some(text),
                            b"value" => value = Some(text),
                            _ => {}
                        }
                    }
                    if let (Some(key), Some(value)) = (key, value) {
                        properties.insert(key, value);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(anyhow!(
                        "OVF parse error at byte {}: {err}",
                        reader.buffer_position()
                    ))
                }
            }
        }

        debug!("Parsed {} OVF properties", properties.len());
        Ok(Self { properties })
    }

    /// Read and parse an environment file
    pub fn from_file(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read OVF environment {}", path.display()))?;
        Self::parse(&xml)
    }

    /// Value of the property `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All parsed properties
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

/// Management addressing and SMC contact details for a new engine node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub management_ip: String,
    pub netmask: String,
    pub gateway: Option<String>,
    pub dns: Vec<String>,
    /// Address of the SMC the node makes initial contact with
    pub smc_address: Option<String>,
    /// One-time key authorizing the initial contact
    pub smc_api_key: Option<String>,
}

impl NodeConfig {
    /// Build from OVF properties. Fails when the management addressing is
    /// incomplete; the SMC contact details are optional.
    pub fn from_environment(env: &OvfEnvironment) -> Result<Self> {
        let management_ip = env
            .get("management.ip0")
            .ok_or_else(|| anyhow!("OVF environment has no management.ip0 property"))?
            .to_string();
        let netmask = env
            .get("management.netmask0")
            .ok_or_else(|| anyhow!("OVF environment has no management.netmask0 property"))?
            .to_string();

        let dns = env
            .get("management.DNS")
            .map(|servers| {
                servers
                    .split(',')
                    .map(str::trim)
                    .filter(|server| !server.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            management_ip,
            netmask,
            gateway: env.get("management.gateway").map(str::to_string),
            dns,
            smc_address: env.get("smcaddress").map(str::to_string),
            smc_api_key: env.get("smcapikey").map(str::to_string),
        })
    }

    /// Argument list handed to the node configuration script
    pub fn script_args(&self) -> Vec<String> {
        let mut args = vec![
            "--ip".to_string(),
            self.management_ip.clone(),
            "--netmask".to_string(),
            self.netmask.clone(),
        ];
        if let Some(gateway) = &self.gateway {
            args.push("--gateway".to_string());
            args.push(gateway.clone());
        }
        if !self.dns.is_empty() {
            args.push("--dns".to_string());
            args.push(self.dns.join(","));
        }
        if let Some(address) = &self.smc_address {
            args.push("--smc-address".to_string());
            args.push(address.clone());
        }
        if let Some(key) = &self.smc_api_key {
            args.push("--smc-key".to_string());
            args.push(key.clone());
        }
        args
    }

    /// Run the platform configuration script with the derived arguments
    pub fn apply(&self, script: &Path) -> Result<()> {
        info!("Configuring node via {}", script.display());
        let status = Command::new(script)
            .args(self.script_args())
            .status()
            .with_context(|| format!("Failed to run {}", script.display()))?;

        if !status.success() {
            return Err(anyhow!("{} exited with {status}", script.display()));
        }
        Ok(())
    }
}
