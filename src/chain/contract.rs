//! Contract binding and call handles.
//!
//! Binding is a local composition step: no network call is made until a
//! [`ContractCall`] is executed. The bound address and interface never
//! change; rebinding produces a new value.

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::Function;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::{Filter, TransactionRequest};
use std::sync::Arc;

use crate::chain::connection::Connection;
use crate::chain::interface::ContractInterface;
use crate::error::{ErrorCode, ServiceError, ServiceResult};

/// Parse a contract address string.
pub fn parse_address(raw: &str) -> ServiceResult<Address> {
    raw.trim().parse::<Address>().map_err(|e| {
        ServiceError::new(
            ErrorCode::InvalidContractAddress,
            format!("Invalid contract address '{}': {}", raw, e),
        )
        .with_source(e)
    })
}

/// A fixed address and interface bound to a connection.
#[derive(Clone, Debug)]
pub struct ContractBinding {
    address: Address,
    interface: Arc<ContractInterface>,
    connection: Connection,
}

impl ContractBinding {
    /// Bind `interface` at `address` over `connection`.
    pub fn bind(
        connection: Connection,
        address: Address,
        interface: Arc<ContractInterface>,
    ) -> ServiceResult<Self> {
        if address == Address::ZERO {
            return Err(ServiceError::new(
                ErrorCode::InvalidContractAddress,
                "Contract address must not be the zero address",
            ));
        }

        tracing::debug!(
            address = %address,
            interface = interface.name(),
            version = interface.version(),
            "Contract bound"
        );

        Ok(Self {
            address,
            interface,
            connection,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn interface(&self) -> &Arc<ContractInterface> {
        &self.interface
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Build a call handle for `name` with already typed arguments.
    pub fn function(&self, name: &str, args: &[DynSolValue]) -> ServiceResult<ContractCall> {
        let function = self.interface.function(name)?.clone();

        if args.len() != function.inputs.len() {
            return Err(ServiceError::new(
                ErrorCode::EncodingError,
                format!(
                    "Function '{}' takes {} arguments, got {}",
                    name,
                    function.inputs.len(),
                    args.len()
                ),
            ));
        }

        let calldata = function.abi_encode_input(args).map_err(|e| {
            ServiceError::new(
                ErrorCode::EncodingError,
                format!("Cannot encode arguments for '{}': {}", name, e),
            )
            .with_source(e)
        })?;

        Ok(ContractCall {
            binding: self.clone(),
            function,
            calldata: calldata.into(),
            value: U256::ZERO,
        })
    }

    /// Build a call handle from textual arguments, coercing each to the
    /// declared parameter type.
    pub fn function_with_strings(&self, name: &str, args: &[&str]) -> ServiceResult<ContractCall> {
        let function = self.interface.function(name)?;

        if args.len() != function.inputs.len() {
            return Err(ServiceError::new(
                ErrorCode::EncodingError,
                format!(
                    "Function '{}' takes {} arguments, got {}",
                    name,
                    function.inputs.len(),
                    args.len()
                ),
            ));
        }

        let mut values = Vec::with_capacity(args.len());
        for (param, raw) in function.inputs.iter().zip(args) {
            let ty = param.resolve().map_err(|e| {
                ServiceError::new(
                    ErrorCode::EncodingError,
                    format!("Cannot resolve type of '{}': {}", param.name, e),
                )
                .with_source(e)
            })?;
            let value = ty.coerce_str(raw).map_err(|e| {
                ServiceError::new(
                    ErrorCode::EncodingError,
                    format!("Argument '{}' is not a valid {}: {}", param.name, ty, e),
                )
                .with_source(e)
            })?;
            values.push(value);
        }

        self.function(name, &values)
    }

    /// Log filter over this contract's address for an inclusive block range.
    pub fn log_filter(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new()
            .address(self.address)
            .from_block(from_block)
            .to_block(to_block)
    }
}

/// A prepared call against a bound contract.
///
/// Cloneable so retry closures can execute it repeatedly.
#[derive(Clone, Debug)]
pub struct ContractCall {
    binding: ContractBinding,
    function: Function,
    calldata: Bytes,
    value: U256,
}

impl ContractCall {
    /// Attach native value (for payable functions).
    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn calldata(&self) -> &Bytes {
        &self.calldata
    }

    /// The transaction request this call sends.
    pub fn request(&self) -> TransactionRequest {
        let tx = TransactionRequest::default()
            .with_to(self.binding.address)
            .with_input(self.calldata.clone());
        if self.value.is_zero() {
            tx
        } else {
            tx.with_value(self.value)
        }
    }

    /// Execute as a read (`eth_call`) and decode the outputs.
    pub async fn call(&self) -> ServiceResult<Vec<DynSolValue>> {
        let raw = self
            .binding
            .connection
            .transport()
            .call(self.request())
            .await?;

        self.function.abi_decode_output(&raw).map_err(|e| {
            ServiceError::new(
                ErrorCode::DecodingError,
                format!("Cannot decode output of '{}': {}", self.function.name, e),
            )
            .with_source(e)
        })
    }

    /// Submit as a transaction signed by the endpoint.
    pub async fn send(&self) -> ServiceResult<TxHash> {
        let tx_hash = self
            .binding
            .connection
            .transport()
            .send_transaction(self.request())
            .await?;

        tracing::info!(
            function = %self.function.name,
            tx_hash = %tx_hash,
            "Transaction submitted"
        );
        Ok(tx_hash)
    }
}
