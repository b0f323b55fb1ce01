use admit_card_bot::health::{HealthServer, HEALTH_BODY};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[cfg(test)]
mod tests {
    use super::*;

    async fn request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health_check_answers_ok() {
        let server = HealthServer::start("127.0.0.1:0".parse().unwrap()).unwrap();

        let response = request(server.local_addr(), "GET", "/").await;

        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with(HEALTH_BODY));
    }

    #[tokio::test]
    async fn test_any_path_and_method_answers_ok() {
        let server = HealthServer::start("127.0.0.1:0".parse().unwrap()).unwrap();

        for (method, path) in [("GET", "/healthz"), ("HEAD", "/"), ("POST", "/anything/else")] {
            let response = request(server.local_addr(), method, path).await;
            assert!(response.starts_with("HTTP/1.1 200 OK"), "{method} {path}: {response}");
        }
    }

    #[test]
    fn test_port_in_use_is_reported() {
        let first = HealthServer::start("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(HealthServer::start(first.local_addr()).is_err());
    }
}
