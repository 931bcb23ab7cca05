use crate::error::TargetError;
use crate::models::{Endpoint, DEFAULT_PORT};
use async_trait::async_trait;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::vec;
use tokio::net::lookup_host;

/// Name resolution used for non-literal hosts.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        Ok(lookup_host((host, 0)).await?.map(|socket| socket.ip()).collect())
    }
}

/// Lazy sequence of endpoints produced by one target.
pub enum Endpoints {
    Cidr(CidrWalk),
    Resolved(vec::IntoIter<Endpoint>),
}

impl Iterator for Endpoints {
    type Item = Endpoint;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Endpoints::Cidr(walk) => walk.next(),
            Endpoints::Resolved(iter) => iter.next(),
        }
    }
}

/// Every address of a block, network and broadcast included, in ascending order.
pub struct CidrWalk {
    net: IpNet,
    next: Option<IpAddr>,
}

impl CidrWalk {
    pub fn new(net: IpNet) -> Self {
        Self {
            next: Some(net.network()),
            net,
        }
    }
}

impl Iterator for CidrWalk {
    type Item = Endpoint;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !self.net.contains(&current) {
            return None;
        }
        self.next = next_address(current);
        Some(Endpoint::new(current, DEFAULT_PORT))
    }
}

/// Big-endian increment of the address bytes. `None` once the address wraps.
pub fn next_address(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(v4) => {
            let mut octets = v4.octets();
            increment(&mut octets).then(|| IpAddr::V4(Ipv4Addr::from(octets)))
        }
        IpAddr::V6(v6) => {
            let mut octets = v6.octets();
            increment(&mut octets).then(|| IpAddr::V6(Ipv6Addr::from(octets)))
        }
    }
}

fn increment(bytes: &mut [u8]) -> bool {
    for byte in bytes.iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            return true;
        }
    }
    false
}

/// Splits `host:port` or `[host]:port`. Anything else is a bare host. An
/// empty port counts as no port.
pub fn split_host_port(target: &str) -> Result<(&str, Option<&str>), TargetError> {
    if let Some(rest) = target.strip_prefix('[') {
        let malformed = || TargetError::BadAddress {
            target: target.to_string(),
        };
        let (host, tail) = rest.split_once(']').ok_or_else(malformed)?;
        return match tail {
            "" => Ok((host, None)),
            _ => match tail.strip_prefix(':') {
                Some(port) => Ok((host, (!port.is_empty()).then_some(port))),
                None => Err(malformed()),
            },
        };
    }

    Ok(match target.rsplit_once(':') {
        // Unbracketed v6 literal.
        Some((host, _)) if host.contains(':') => (target, None),
        Some((host, port)) if !host.is_empty() => (host, (!port.is_empty()).then_some(port)),
        _ => (target, None),
    })
}

fn parse_port(raw: Option<&str>) -> Result<u16, TargetError> {
    match raw {
        None => Ok(DEFAULT_PORT),
        Some(text) => text.parse().map_err(|_| TargetError::InvalidPort {
            port: text.to_string(),
        }),
    }
}

/// Expands one target (host, host:port, ip, ip:port or CIDR) into endpoints.
pub async fn expand(target: &str, resolver: &dyn Resolve) -> Result<Endpoints, TargetError> {
    if let Ok(net) = target.parse::<IpNet>() {
        return Ok(Endpoints::Cidr(CidrWalk::new(net)));
    }

    let (host, port) = split_host_port(target)?;
    let port = parse_port(port)?;

    let ips = match host.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => resolver
            .lookup(host)
            .await
            .map_err(|source| TargetError::Lookup {
                host: host.to_string(),
                source,
            })?,
    };

    let mut endpoints: Vec<Endpoint> = Vec::with_capacity(ips.len());
    for ip in ips {
        let endpoint = Endpoint::new(ip, port);
        if !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
    }

    if endpoints.is_empty() {
        return Err(TargetError::NoAddresses {
            host: host.to_string(),
        });
    }

    Ok(Endpoints::Resolved(endpoints.into_iter()))
}
