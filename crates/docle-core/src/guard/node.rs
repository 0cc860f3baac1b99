use super::hosts_literal;

const HOSTS_PLACEHOLDER: &str = "__DOCLE_ALLOWED_HOSTS__";

const TEMPLATE: &str = r#"const originalFetch = globalThis.fetch;
const allowedHosts = __DOCLE_ALLOWED_HOSTS__;

function isHostAllowed(hostname) {
  return allowedHosts.some((pattern) => {
    if (pattern.startsWith('*.')) {
      const domain = pattern.slice(2);
      return hostname === domain || hostname.endsWith('.' + domain);
    } else if (pattern.startsWith('*')) {
      return hostname.endsWith(pattern.slice(1));
    }
    return hostname === pattern;
  });
}

globalThis.fetch = async function (input, init) {
  const target =
    typeof Request !== 'undefined' && input instanceof Request ? input.url : String(input);
  const hostname = new URL(target).hostname;
  if (!isHostAllowed(hostname)) {
    throw new Error(`Network access denied: ${hostname} is not in allowed hosts list`);
  }
  return originalFetch(input, init);
};

module.exports = { isHostAllowed };
"#;

/// Guard for the Node runtime. Replaces `globalThis.fetch`; preloaded with
/// `node -r`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGuard {
    allowed_hosts: Vec<String>,
}

impl NodeGuard {
    pub fn new(allowed_hosts: &[String]) -> Self {
        Self {
            allowed_hosts: allowed_hosts.to_vec(),
        }
    }

    pub fn render(&self) -> String {
        TEMPLATE.replacen(HOSTS_PLACEHOLDER, &hosts_literal(&self.allowed_hosts), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeds_host_list_literal() {
        let source = NodeGuard::new(&["*.example.com".to_string()]).render();
        assert!(source.contains(r#"const allowedHosts = ["*.example.com"];"#));
        assert!(!source.contains(HOSTS_PLACEHOLDER));
    }

    #[test]
    fn test_wraps_fetch_and_delegates() {
        let source = NodeGuard::new(&[]).render();
        assert!(source.starts_with("const originalFetch = globalThis.fetch;"));
        assert!(source.contains("globalThis.fetch = async function (input, init)"));
        assert!(source.contains("return originalFetch(input, init);"));
        assert!(source.contains("new URL(target).hostname"));
    }

    #[test]
    fn test_denial_names_host() {
        let source = NodeGuard::new(&[]).render();
        assert!(source
            .contains("Network access denied: ${hostname} is not in allowed hosts list"));
    }

    #[test]
    fn test_exports_matcher() {
        let source = NodeGuard::new(&[]).render();
        assert!(source.trim_end().ends_with("module.exports = { isHostAllowed };"));
    }
}
