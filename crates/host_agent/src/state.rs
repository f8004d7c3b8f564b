//! Classifies a server's runtime health from processes and sockets.

use crate::process::ProcessTable;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, trace};
use weaver_types::ConnectivityState;

/// Observes whether a port is being listened on
pub trait SocketProbe: Send + Sync {
    fn is_listening(&self, port: u16) -> bool;
}

/// Treats a port as listening when binding it fails with `AddrInUse`,
/// over either TCP or UDP.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindProbe;

impl SocketProbe for BindProbe {
    fn is_listening(&self, port: u16) -> bool {
        let in_use = |kind: ErrorKind| kind == ErrorKind::AddrInUse;
        let tcp = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .err()
            .map(|e| in_use(e.kind()))
            .unwrap_or(false);
        if tcp {
            return true;
        }
        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .err()
            .map(|e| in_use(e.kind()))
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct StateDetector {
    processes: Arc<dyn ProcessTable>,
    sockets: Arc<dyn SocketProbe>,
}

impl StateDetector {
    pub fn new(processes: Arc<dyn ProcessTable>, sockets: Arc<dyn SocketProbe>) -> Self {
        Self { processes, sockets }
    }

    pub fn processes(&self) -> &Arc<dyn ProcessTable> {
        &self.processes
    }

    pub async fn detect(&self, install_dir: &Path, ports: &[u16]) -> ConnectivityState {
        if !install_dir.is_dir() {
            return ConnectivityState::Uninstalled;
        }

        let processes = match self.processes.processes_under(install_dir).await {
            Ok(found) => found.len(),
            Err(e) => {
                error!("State detection for {} failed: {}", install_dir.display(), e);
                return ConnectivityState::Unknown;
            }
        };
        let sockets = ports
            .iter()
            .filter(|port| self.sockets.is_listening(**port))
            .count();
        trace!(
            "{}: {} processes, {} listening ports",
            install_dir.display(),
            processes,
            sockets
        );

        match (processes, sockets) {
            (0, _) => ConnectivityState::Shutdown,
            (_, 0) => ConnectivityState::Stalled,
            _ => ConnectivityState::InternallyConnectable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::process::ProcessInfo;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FixedProcesses(Result<usize, ()>);

    #[async_trait]
    impl ProcessTable for FixedProcesses {
        async fn processes_under(&self, dir: &Path) -> Result<Vec<ProcessInfo>, ProcessError> {
            match self.0 {
                Ok(n) => Ok((0..n)
                    .map(|i| ProcessInfo {
                        pid: 100 + i as u32,
                        exe: dir.join("server"),
                    })
                    .collect()),
                Err(()) => Err(ProcessError::Enumeration("denied".to_string())),
            }
        }

        async fn terminate_under(&self, _dir: &Path) -> Result<usize, ProcessError> {
            Ok(0)
        }
    }

    struct FixedPorts(HashSet<u16>);

    impl SocketProbe for FixedPorts {
        fn is_listening(&self, port: u16) -> bool {
            self.0.contains(&port)
        }
    }

    fn detector(processes: Result<usize, ()>, listening: &[u16]) -> StateDetector {
        StateDetector::new(
            Arc::new(FixedProcesses(processes)),
            Arc::new(FixedPorts(listening.iter().copied().collect())),
        )
    }

    #[tokio::test]
    async fn test_classification() {
        let dir = tempfile::tempdir().unwrap();
        let ports = [27015, 27016];

        assert_eq!(
            detector(Ok(0), &[]).detect(&dir.path().join("missing"), &ports).await,
            ConnectivityState::Uninstalled
        );
        assert_eq!(
            detector(Ok(0), &[27015]).detect(dir.path(), &ports).await,
            ConnectivityState::Shutdown
        );
        assert_eq!(
            detector(Ok(2), &[]).detect(dir.path(), &ports).await,
            ConnectivityState::Stalled
        );
        assert_eq!(
            detector(Ok(1), &[27016]).detect(dir.path(), &ports).await,
            ConnectivityState::InternallyConnectable
        );
        assert_eq!(
            detector(Err(()), &[]).detect(dir.path(), &ports).await,
            ConnectivityState::Unknown
        );
    }

    #[test]
    fn test_bind_probe_sees_bound_port() {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(BindProbe.is_listening(port));
    }
}
