use super::hosts_literal;

const HOSTS_PLACEHOLDER: &str = "__DOCLE_ALLOWED_HOSTS__";

const TEMPLATE: &str = r#"import urllib.error
import urllib.request
from urllib.parse import urlparse

_allowed_hosts = __DOCLE_ALLOWED_HOSTS__
_original_urlopen = urllib.request.urlopen


def _is_host_allowed(hostname):
    for pattern in _allowed_hosts:
        if pattern.startswith("*."):
            domain = pattern[2:]
            if hostname == domain or hostname.endswith("." + domain):
                return True
        elif pattern.startswith("*"):
            if hostname.endswith(pattern[1:]):
                return True
        elif hostname == pattern:
            return True
    return False


def _hostname_of(url):
    target = url if isinstance(url, str) else getattr(url, "full_url", str(url))
    return urlparse(target).hostname or ""


def _denial(hostname):
    return "Network access denied: " + hostname + " is not in allowed hosts list"


def _checked_urlopen(url, *args, **kwargs):
    hostname = _hostname_of(url)
    if not _is_host_allowed(hostname):
        raise urllib.error.URLError(_denial(hostname))
    return _original_urlopen(url, *args, **kwargs)


urllib.request.urlopen = _checked_urlopen

try:
    import requests
    import requests.sessions

    _original_session_request = requests.sessions.Session.request

    def _checked_session_request(self, method, url, *args, **kwargs):
        hostname = _hostname_of(url)
        if not _is_host_allowed(hostname):
            raise requests.exceptions.ConnectionError(_denial(hostname))
        return _original_session_request(self, method, url, *args, **kwargs)

    requests.sessions.Session.request = _checked_session_request
except ImportError:
    pass
"#;

/// Guard for the Python runtime. Wraps `urllib.request.urlopen` and, when the
/// `requests` package is importable, `requests.sessions.Session.request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonGuard {
    allowed_hosts: Vec<String>,
}

impl PythonGuard {
    pub fn new(allowed_hosts: &[String]) -> Self {
        Self {
            allowed_hosts: allowed_hosts.to_vec(),
        }
    }

    pub fn render(&self) -> String {
        TEMPLATE.replacen(HOSTS_PLACEHOLDER, &hosts_literal(&self.allowed_hosts), 1)
    }
}
